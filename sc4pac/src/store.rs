// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Typed JSON persistence with optimistic concurrency: a write states what
//! it believes the prior file content to be and fails with [`Error::Stale`]
//! when the file has moved on underneath it. Writes go through a sibling
//! temp file and an atomic rename.

use std::path::Path;

use fs_err as fs;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Read and deserialize `path`, `None` if the file does not exist.
pub fn read<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<T>, Error> {
    Ok(match read_raw(path)? {
        Some(raw) => Some(serde_json::from_value(raw)?),
        None => None,
    })
}

/// Read the raw JSON value of `path`, `None` if the file does not exist.
/// The raw value is the token for a later compare-and-swap [`write`].
pub fn read_raw(path: impl AsRef<Path>) -> Result<Option<Value>, Error> {
    match fs::read(path.as_ref()) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `value` to `path` provided the file still holds `expected_prior`
/// (`None` meaning the file must not exist yet).
pub fn write<T: Serialize>(
    path: impl AsRef<Path>,
    value: &T,
    expected_prior: Option<&Value>,
) -> Result<(), Error> {
    let path = path.as_ref();

    let current = read_raw(path)?;
    if current.as_ref() != expected_prior {
        return Err(Error::Stale);
    }

    overwrite(path, value)
}

/// Atomically replace `path` with `value`, no prior expectation.
pub fn overwrite<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), Error> {
    let path = path.as_ref();
    let serialized = serde_json::to_vec_pretty(value)?;

    let dir = path.parent().ok_or_else(|| Error::NoParent(path.display().to_string()))?;
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut temp, &serialized)?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}

/// Read `path`, writing and returning the default when the file is absent.
pub fn read_or_init<T>(path: impl AsRef<Path>, init: impl FnOnce() -> T) -> Result<T, Error>
where
    T: Serialize + DeserializeOwned,
{
    let path = path.as_ref();

    match read(path)? {
        Some(value) => Ok(value),
        None => {
            let value = init();
            write(path, &value, None)?;
            Ok(value)
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("file changed since it was read")]
    Stale,
    #[error("no parent directory for {0}")]
    NoParent(String),
}

#[cfg(test)]
mod test {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        count: u32,
    }

    #[test]
    fn write_requires_expected_prior() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        // Fresh write expects no prior file
        write(&path, &Doc { count: 1 }, None).unwrap();
        assert!(matches!(write(&path, &Doc { count: 2 }, None), Err(Error::Stale)));

        // Stepping through the raw prior succeeds
        let prior = read_raw(&path).unwrap().unwrap();
        write(&path, &Doc { count: 2 }, Some(&prior)).unwrap();

        // The old token is now stale
        assert!(matches!(
            write(&path, &Doc { count: 3 }, Some(&prior)),
            Err(Error::Stale)
        ));

        assert_eq!(read::<Doc>(&path).unwrap(), Some(Doc { count: 2 }));
    }

    #[test]
    fn read_or_init_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        assert_eq!(read::<Doc>(&path).unwrap(), None);
        assert_eq!(read_or_init(&path, Doc::default).unwrap(), Doc { count: 0 });
        assert_eq!(read::<Doc>(&path).unwrap(), Some(Doc { count: 0 }));

        // Existing content wins over the init value
        let prior = read_raw(&path).unwrap().unwrap();
        write(&path, &Doc { count: 7 }, Some(&prior)).unwrap();
        assert_eq!(read_or_init(&path, Doc::default).unwrap(), Doc { count: 7 });
    }
}
