//! Implementation of the `kiln sign` command.
//!
//! Each step is a named, ordered list of input files. Steps are signed in
//! parallel against one shared [`SignatureSession`], then the digest cache is
//! persisted so the next run can reuse content digests.

use std::collections::HashSet;
use std::path::PathBuf;

use kiln_cache::{SignatureSession, StatsSnapshot};
use rayon::prelude::*;
use serde::Serialize;

use crate::project::{load_project, Project};
use crate::{GlobalArgs, ReportFormat, SignArgs};

/// Name given to the step formed by positional `FILES`.
pub const DEFAULT_STEP: &str = "default";

/// One build step: a name and its inputs in signing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    /// Step name, unique within one invocation.
    pub name: String,
    /// Input files, signed in this order.
    pub inputs: Vec<PathBuf>,
}

/// Signature of one step, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSignature {
    /// Step name.
    pub name: String,
    /// Signature as 32 lowercase hex digits.
    pub signature: String,
}

/// Counters reported by `--stats`.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Digest-level counters.
    #[serde(flatten)]
    pub signature: StatsSnapshot,
    /// Stat lookups answered from the per-run stat cache.
    pub stat_cache_hits: u64,
    /// Stat lookups that queried the filesystem.
    pub stat_cache_misses: u64,
    /// Entries in the digest cache after signing.
    pub digest_cache_entries: usize,
}

#[derive(Serialize)]
struct SignReport<'a> {
    steps: &'a [StepSignature],
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a RunStats>,
}

/// Runs `kiln sign`.
pub fn run(args: &SignArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let steps = collect_steps(args)?;
    let project = load_project(global)?;
    let session = open_session(&project);

    let signatures = match args.jobs {
        Some(jobs) => rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()?
            .install(|| sign_steps(&session, &steps)),
        None => sign_steps(&session, &steps),
    };

    let stats = args.stats.then(|| run_stats(&session));
    match args.format {
        ReportFormat::Text => print!("{}", render_text(&signatures, stats.as_ref())),
        ReportFormat::Json => {
            let report = SignReport {
                steps: &signatures,
                stats: stats.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    let saved = session.save()?;
    log::debug!(
        "saved {saved} digest(s) to {}",
        project.digest_cache_file().display()
    );
    Ok(0)
}

/// Opens a session using the project's cache location and extension policy.
pub fn open_session(project: &Project) -> SignatureSession {
    let cache = &project.config.cache;
    let policy = project.config.extension_policy();
    SignatureSession::open(
        &project.digest_cache_file(),
        cache.max_age(),
        policy.hashes().to_vec(),
    )
}

/// Builds the list of steps from `--step` flags and positional files.
pub fn collect_steps(args: &SignArgs) -> Result<Vec<StepSpec>, String> {
    let mut steps = args
        .steps
        .iter()
        .map(|s| parse_step(s))
        .collect::<Result<Vec<_>, _>>()?;

    if !args.files.is_empty() {
        steps.push(StepSpec {
            name: DEFAULT_STEP.to_string(),
            inputs: args.files.iter().map(PathBuf::from).collect(),
        });
    }

    if steps.is_empty() {
        return Err("nothing to sign: pass FILES or --step NAME=FILE[,FILE...]".to_string());
    }

    let mut seen = HashSet::new();
    for step in &steps {
        if !seen.insert(step.name.as_str()) {
            return Err(format!("duplicate step name '{}'", step.name));
        }
    }
    Ok(steps)
}

/// Parses `NAME=FILE[,FILE...]`. An empty file list is a step with no inputs.
pub fn parse_step(arg: &str) -> Result<StepSpec, String> {
    let (name, files) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid step '{arg}': expected NAME=FILE[,FILE...]"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid step '{arg}': empty step name"));
    }
    let inputs = files
        .split(',')
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect();
    Ok(StepSpec {
        name: name.to_string(),
        inputs,
    })
}

/// Signs every step in parallel; output order follows `steps`.
pub fn sign_steps(session: &SignatureSession, steps: &[StepSpec]) -> Vec<StepSignature> {
    steps
        .par_iter()
        .map(|step| {
            let signature = session.sign_step(step.inputs.as_slice());
            log::trace!("step '{}' -> {signature}", step.name);
            StepSignature {
                name: step.name.clone(),
                signature: signature.to_string(),
            }
        })
        .collect()
}

fn run_stats(session: &SignatureSession) -> RunStats {
    RunStats {
        signature: session.stats().snapshot(),
        stat_cache_hits: session.stat_cache().hits(),
        stat_cache_misses: session.stat_cache().misses(),
        digest_cache_entries: session.digest_cache().len(),
    }
}

fn render_text(signatures: &[StepSignature], stats: Option<&RunStats>) -> String {
    let mut out = String::new();
    for sig in signatures {
        out.push_str(&format!("{}  {}\n", sig.name, sig.signature));
    }
    if let Some(stats) = stats {
        out.push_str(&format!(
            "\ndigest cache hits:    {}\n\
             digests recomputed:   {} ({:.2} ms)\n\
             stat cache hits:      {}\n\
             stat cache misses:    {}\n\
             digest cache entries: {}\n",
            stats.signature.digest_cache_hits,
            stats.signature.file_digest_count,
            stats.signature.file_digest_time_ms,
            stats.stat_cache_hits,
            stats.stat_cache_misses,
            stats.digest_cache_entries,
        ));
    }
    out
}
