// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Seam between the pipeline and the terminal. The pipeline never talks
//! to stdin directly; it asks a [`Prompter`], and the non-interactive
//! implementation turns required prompts into errors.

use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect, Select};
use thiserror::Error;

pub trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool, Error>;

    /// Pick exactly one of `options`
    fn choose(&self, question: &str, options: &[String]) -> Result<String, Error>;

    /// Pick any subset of `options`, returned as indices
    fn multi_select(&self, question: &str, options: &[String]) -> Result<Vec<usize>, Error>;
}

/// Terminal prompts via dialoguer
#[derive(Debug, Default)]
pub struct Interactive;

impl Prompter for Interactive {
    fn confirm(&self, question: &str, default: bool) -> Result<bool, Error> {
        Ok(Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(default)
            .interact()?)
    }

    fn choose(&self, question: &str, options: &[String]) -> Result<String, Error> {
        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .items(options)
            .default(0)
            .interact()?;
        Ok(options[index].clone())
    }

    fn multi_select(&self, question: &str, options: &[String]) -> Result<Vec<usize>, Error> {
        Ok(MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .items(options)
            .interact()?)
    }
}

/// Required prompts fail; confirmations take their default answer.
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn confirm(&self, _question: &str, default: bool) -> Result<bool, Error> {
        Ok(default)
    }

    fn choose(&self, question: &str, options: &[String]) -> Result<String, Error> {
        Err(Error::NotInteractive(format!(
            "{question} (candidates: {})",
            options.join(", ")
        )))
    }

    fn multi_select(&self, question: &str, _options: &[String]) -> Result<Vec<usize>, Error> {
        Err(Error::NotInteractive(question.to_owned()))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("a choice is required but sc4pac is not running interactively: {0}")]
    NotInteractive(String),
    #[error("prompt failed: {0}")]
    Dialog(#[from] dialoguer::Error),
}
