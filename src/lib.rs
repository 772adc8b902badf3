// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Sharepack
//!
//! A declarative, idempotent provisioning system for data-sharing packs.
//!
//! ## Overview
//!
//! Sharepack reads a single document describing the recipients, shares, and
//! pipelines a data product needs, and converges the sharing platform toward
//! it:
//!
//! - Define recipients, shares, and their feeding pipelines as code
//! - Create what is missing, update what drifted, leave the rest untouched
//! - Compensate partially applied runs by undoing mutations in reverse
//! - Keep a full version history of everything the pack ever provisioned
//!
//! ## Architecture
//!
//! The system is built around **desired state reconciliation**:
//!
//! 1. **Desired State**: the share-pack YAML/JSON document
//! 2. **Observed State**: fetched fresh from the sharing platform
//! 3. **Reconcilers**: compare the two and apply the missing deltas
//!
//! The pack's strategy selects the flow: `NEW` and `UPDATE` converge, while
//! `DELETE` tears the named resources down in dependency order.
//!
//! ## Modules
//!
//! - [`config`]: Document parsing, validation, and fingerprinting
//! - [`remote`]: Sharing-platform clients and resource types
//! - [`diff`]: Membership diff computation
//! - [`reconcile`]: Per-resource reconcilers and the run context
//! - [`rollback`]: Compensation for partially applied runs
//! - [`dispatch`]: Strategy dispatch and run orchestration
//! - [`persist`]: Versioned state stores and the run writer
//! - [`status`]: Run status tracking
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! metadata:
//!   name: sales-pack
//!   workspace: analytics
//!   strategy: UPDATE
//!
//! recipients:
//!   - name: acme
//!
//! shares:
//!   - name: sales
//!     assets:
//!       - cat.sch.orders
//!     recipients:
//!       - acme
//!     pipelines:
//!       - name: orders-scd2
//!         source_table: raw.sch.orders
//!         target_table: cat.sch.orders
//!         scd_type: type2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod persist;
pub mod reconcile;
pub mod remote;
pub mod rollback;
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{PackHasher, PackParser, PackValidator, SharePackConfig, Strategy};
pub use diff::{DiffEngine, MembershipDiff};
pub use dispatch::{ProvisionOutcome, Provisioner};
pub use error::{Result, SharePackError};
pub use persist::{PersistenceWriter, Repositories, VersionStore};
pub use reconcile::{
    EnsureOutcome, EnsureReport, PipelineReconciler, RecipientReconciler, RunContext,
    ShareReconciler,
};
pub use remote::{HttpRemoteClient, RemoteContext, RemoteScope};
pub use rollback::{RollbackManager, RollbackReport};
pub use status::{RunState, RunStatus, StatusSink, StatusTracker};
