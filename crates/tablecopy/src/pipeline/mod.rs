//! Job planning: what to copy and the SQL that copies it.
//!
//! - [`TableJob`]: Command pattern encapsulating one table copy
//! - [`QueryPlan`]: source SELECT and COUNT statements for a job
//! - [`DdlPlan`]: CREATE TABLE synthesized from source column metadata
//!
//! Planning is pure: nothing here touches a connection, so every statement a
//! job would run can be computed (and logged) in dry-run mode.

mod ddl;
mod job;
mod plan;

pub use ddl::{synthesize_ddl, DdlPlan};
pub use job::{ColumnMapping, IncrementalFilter, JobSource, TableJob, DEFAULT_BATCH_SIZE};
pub use plan::{render_bound, QueryPlan, EXPR_PREFIX};
