// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SunMeter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use thiserror::Error;

/// Failures a telemetry source can report. Any of these aborts the current
/// collection tick; none of them may leave partial calibration state behind.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("credential exchange failed: {0}")]
    Auth(String),

    #[error("telemetry fetch failed: {0}")]
    Fetch(String),

    #[error("telemetry request timed out")]
    Timeout,
}

pub type SourceResult<T> = Result<T, SourceError>;
