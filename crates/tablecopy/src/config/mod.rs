//! Configuration loading and resolution.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use tracing::debug;

use crate::drivers::normalize_driver;
use crate::error::{CopyError, Result};
use crate::pipeline::{ColumnMapping, IncrementalFilter, TableJob};
use crate::typemap::RowSizePolicy;

/// Table discovery settings for `table_list.from_source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub schema: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub defaults: TableConfig,
}

impl Discovery {
    /// Job for a discovered table, built from the defaults.
    ///
    /// The defaults' `source_table`, `target_table` and `select_sql` are
    /// ignored: every discovered table copies into a table of its own name.
    pub fn job_for(&self, table: &str) -> TableJob {
        let entry = TableConfig {
            source_table: table.to_string(),
            target_table: None,
            select_sql: None,
            ..self.defaults.clone()
        };
        entry.to_job()
    }
}

/// A resolved, validated run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub source: Endpoint,
    pub target: Endpoint,
    /// Explicit jobs, in configuration order.
    pub jobs: Vec<TableJob>,
    /// Present when the table list is discovered from the source at run time.
    pub discovery: Option<Discovery>,
    pub row_policy: RowSizePolicy,
    pub dry_run: bool,
}

impl RunPlan {
    /// A plan for one job between two endpoints.
    pub fn single(source: Endpoint, target: Endpoint, job: TableJob) -> Result<Self> {
        let plan = Self {
            source: normalize_endpoint(source),
            target: normalize_endpoint(target),
            jobs: vec![job],
            discovery: None,
            row_policy: RowSizePolicy::default(),
            dry_run: false,
        };
        validation::validate_endpoint("source", &plan.source)?;
        validation::validate_endpoint("target", &plan.target)?;
        for job in &plan.jobs {
            job.validate().map_err(|e| CopyError::Config(e.to_string()))?;
        }
        Ok(plan)
    }

    /// Mark every job, explicit or discovered, as a dry run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = self.dry_run || dry_run;
        if self.dry_run {
            for job in &mut self.jobs {
                job.dry_run = true;
            }
        }
        self
    }
}

impl Config {
    /// Load a configuration file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CopyError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        debug!(
            "Loading {} config from {}",
            if is_yaml { "YAML" } else { "JSON" },
            path.display()
        );

        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolve either layout into a validated [`RunPlan`].
    ///
    /// # Errors
    ///
    /// [`CopyError::Config`] for missing endpoints or tables, unknown source
    /// names, jobs without a source and duplicate column mappings;
    /// [`CopyError::Regex`] for filter patterns that do not compile.
    pub fn resolve(&self) -> Result<RunPlan> {
        let (source, target, entries, discovery) = if !self.sources.is_empty() && self.sync.is_some()
        {
            self.resolve_named()?
        } else {
            self.resolve_legacy()?
        };

        let source = normalize_endpoint(source);
        let target = normalize_endpoint(target);
        validation::validate_endpoint("source", &source)?;
        validation::validate_endpoint("target", &target)?;

        let mut jobs = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            validation::validate_table(i, entry)?;
            jobs.push(entry.to_job());
        }

        if let Some(discovery) = &discovery {
            validation::validate_filters(&discovery.include, &discovery.exclude)?;
            validation::validate_columns("table_list.defaults", &discovery.defaults.columns)?;
        }

        Ok(RunPlan {
            source,
            target,
            jobs,
            discovery,
            row_policy: self.row_size_policy,
            dry_run: false,
        })
    }

    fn resolve_legacy(&self) -> Result<(Endpoint, Endpoint, Vec<TableConfig>, Option<Discovery>)> {
        let (Some(source), Some(target)) = (&self.source, &self.target) else {
            return Err(CopyError::Config(
                "configure either source/target/tables or sources/sync/table_list".into(),
            ));
        };
        if self.tables.is_empty() {
            return Err(CopyError::Config("tables must not be empty".into()));
        }
        Ok((source.clone(), target.clone(), self.tables.clone(), None))
    }

    fn resolve_named(&self) -> Result<(Endpoint, Endpoint, Vec<TableConfig>, Option<Discovery>)> {
        let sync = self.sync.clone().unwrap_or_default();
        let (source_name, target_name) = (sync.source.trim(), sync.target.trim());
        if source_name.is_empty() || target_name.is_empty() {
            return Err(CopyError::Config(
                "sync.source and sync.target are required".into(),
            ));
        }

        let lookup = |name: &str| {
            self.sources
                .get(name)
                .cloned()
                .ok_or_else(|| CopyError::Config(format!("sources has no entry named {}", name)))
        };
        let source = lookup(source_name)?;
        let target = lookup(target_name)?;

        let Some(list) = &self.table_list else {
            return Err(CopyError::Config(
                "table_list is required with sources/sync".into(),
            ));
        };

        if list.from_source {
            let entries = list
                .list
                .iter()
                .filter(|t| !t.source_table.trim().is_empty() || t.select_sql.is_some())
                .cloned()
                .collect();
            let discovery = Discovery {
                schema: list
                    .schema
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                include: list.include.clone(),
                exclude: list.exclude.clone(),
                defaults: list.defaults.clone().unwrap_or_default(),
            };
            return Ok((source, target, entries, Some(discovery)));
        }

        if list.list.is_empty() {
            return Err(CopyError::Config(
                "table_list.list must not be empty unless from_source is true".into(),
            ));
        }
        Ok((source, target, list.list.clone(), None))
    }
}

fn normalize_endpoint(endpoint: Endpoint) -> Endpoint {
    Endpoint {
        driver: normalize_driver(&endpoint.driver),
        dsn: endpoint.dsn.trim().to_string(),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl TableConfig {
    /// Build the job for this entry, applying defaults for empty fields.
    pub fn to_job(&self) -> TableJob {
        let source_table = self.source_table.trim();
        let target = non_empty(&self.target_table).unwrap_or_else(|| source_table.to_string());

        let job = match non_empty(&self.select_sql) {
            Some(sql) => TableJob::for_query(sql, target),
            None => TableJob::for_table(source_table).with_target(target),
        };

        let batch_size = self
            .batch_size
            .filter(|n| *n > 0)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);

        let mut job = job
            .with_where(self.where_clause.clone().unwrap_or_default())
            .with_batch_size(batch_size)
            .with_auto_create(self.auto_create)
            .with_columns(self.columns.iter().map(ColumnConfig::to_mapping).collect());

        if let Some(key) = non_empty(&self.incremental_key) {
            job = job.with_incremental(IncrementalFilter {
                key,
                since: non_empty(&self.since),
                until: non_empty(&self.until),
            });
        }
        job
    }
}

impl ColumnConfig {
    pub fn to_mapping(&self) -> ColumnMapping {
        let mut mapping =
            ColumnMapping::new(self.source.trim()).to(self.target.clone().unwrap_or_default().trim());
        if let Some(ty) = non_empty(&self.target_type) {
            mapping = mapping.with_type(ty);
        }
        if let Some(nullable) = self.nullable {
            mapping = mapping.with_nullable(nullable);
        }
        if let Some(default) = non_empty(&self.default_value) {
            mapping = mapping.with_default(default);
        }
        mapping
    }
}
