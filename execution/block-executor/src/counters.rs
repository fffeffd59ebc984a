// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter, Histogram, IntCounter,
};

/// Count of times the block executor's speculative execution was aborted because a read
/// observed an estimate.
pub static SPECULATIVE_ABORT_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "occ_speculative_abort_count",
        "Number of speculative aborts in parallel execution"
    )
    .unwrap()
});

/// Count of incarnations invalidated by a validation sweep.
pub static VALIDATION_FAILURE_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "occ_validation_failure_count",
        "Number of incarnations that failed validation"
    )
    .unwrap()
});

pub static SEQUENTIAL_FALLBACK_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "occ_sequential_fallback_count",
        "Number of blocks that switched to sequential execution after too many incarnations"
    )
    .unwrap()
});

/// Count of transactions that declared an unknown access on any resource, serializing
/// everything after them.
pub static CONSERVATIVE_DECLARATION_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "occ_conservative_declaration_count",
        "Number of transactions declaring an unknown access to any resource"
    )
    .unwrap()
});

pub static DECLARATION_FALLBACK_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "occ_declaration_fallback_count",
        "Number of transactions whose access declaration failed and was made conservative"
    )
    .unwrap()
});

pub static BLOCK_EXECUTION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "occ_block_execution_seconds",
        "Time spent executing a block, including the final flush",
        exponential_buckets(/*start=*/ 1e-4, /*factor=*/ 2.0, /*count=*/ 20).unwrap(),
    )
    .unwrap()
});

pub static TASK_EXECUTE_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "occ_task_execute_seconds",
        "Time spent in a single incarnation, including applying its writes",
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 24).unwrap(),
    )
    .unwrap()
});

pub static TASK_VALIDATE_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "occ_task_validate_seconds",
        "Time spent validating the reads of a single incarnation",
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 24).unwrap(),
    )
    .unwrap()
});

pub static ROUNDS_PER_BLOCK: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "occ_rounds_per_block",
        "Number of validation sweeps needed to execute a block",
        exponential_buckets(/*start=*/ 1.0, /*factor=*/ 2.0, /*count=*/ 12).unwrap(),
    )
    .unwrap()
});
