// Copyright 2025 the Spatialq Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Launch errors and their integer status codes.

use alloc::string::String;

use thiserror::Error;

/// Integer status codes reported for launches.
///
/// Values follow the OpenCL error codes of the equivalent failures.
pub mod status {
    /// The launch was accepted (or completed) successfully.
    pub const SUCCESS: i32 = 0;
    /// The worker pool could not be created.
    pub const OUT_OF_RESOURCES: i32 = -5;
    /// At least one query failed while executing.
    pub const EXEC_STATUS_ERROR: i32 = -14;
    /// The kernel argument list is inconsistent.
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    /// The work-group size is not usable.
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
}

/// Failure to submit or execute a query launch.
///
/// Errors are `Clone` so that every waiter on an [`Event`](crate::Event) observes the
/// same outcome.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// The requested work-group size is zero or above the device limit.
    #[error("invalid work-group size {0}")]
    InvalidWorkGroupSize(usize),
    /// A kernel argument name was bound more than once.
    #[error("kernel argument `{0}` is bound more than once")]
    InvalidKernelArgs(&'static str),
    /// The worker pool could not be created.
    #[error("failed to create worker pool: {0}")]
    OutOfResources(String),
    /// Some queries panicked; the others ran to completion.
    #[error("{failed} of {total} queries failed during execution")]
    ExecutionFailed {
        /// Number of queries that did not complete.
        failed: usize,
        /// Number of queries in the launch.
        total: usize,
    },
}

impl LaunchError {
    /// The integer status code of this error.
    pub const fn status(&self) -> i32 {
        match self {
            Self::InvalidWorkGroupSize(_) => status::INVALID_WORK_GROUP_SIZE,
            Self::InvalidKernelArgs(_) => status::INVALID_KERNEL_ARGS,
            Self::OutOfResources(_) => status::OUT_OF_RESOURCES,
            Self::ExecutionFailed { .. } => status::EXEC_STATUS_ERROR,
        }
    }
}

/// Status code of a launch result.
pub fn status_of<T>(result: &Result<T, LaunchError>) -> i32 {
    match result {
        Ok(_) => status::SUCCESS,
        Err(e) => e.status(),
    }
}
