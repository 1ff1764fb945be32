#![deny(unsafe_code)]
use clap::{Args, Parser, Subcommand};
use spine_config::TrustInputs as ConfigTrustInputs;
use spine_core::{BundleKind, PublicKeyRecord};
use spine_report::{Target, TargetKind, ToolInfo, VerifyCliOutput, VerifyMode};
use spine_verify::{verify_bundle_dir_async, verify_bundle_zip, TrustInputs, VerifyOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Usage / argument error, per the CLI surface.
const EXIT_USAGE_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "spine-verify", version, about = "Offline verifier for settlement proof bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a proof bundle, directory or zip.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct BundleKindArg {
    /// Verify a job-proof bundle.
    #[arg(long)]
    job_proof: bool,
    /// Verify a month-proof bundle.
    #[arg(long)]
    month_proof: bool,
    /// Verify a finance-pack bundle.
    #[arg(long)]
    finance_pack: bool,
    /// Verify an invoice-bundle.
    #[arg(long)]
    invoice_bundle: bool,
    /// Verify a close-pack bundle.
    #[arg(long)]
    close_pack: bool,
}

impl BundleKindArg {
    fn kind(&self) -> BundleKind {
        if self.job_proof {
            BundleKind::JobProofBundleV1
        } else if self.month_proof {
            BundleKind::MonthProofBundleV1
        } else if self.finance_pack {
            BundleKind::FinancePackBundleV1
        } else if self.invoice_bundle {
            BundleKind::InvoiceBundleV1
        } else {
            BundleKind::ClosePackBundleV1
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Json,
    Text,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    kind: BundleKindArg,

    /// Path to the bundle: a directory, or a `.zip` file.
    path: PathBuf,

    /// Reject any warning that `non-strict` mode would otherwise tolerate.
    #[arg(long)]
    strict: bool,

    /// Treat every warning as an error, regardless of mode.
    #[arg(long)]
    fail_on_warnings: bool,

    /// Output format for the result.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Also write the JSON report to this file.
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Number of blocking tasks used to hash bundle files concurrently.
    #[arg(long, default_value_t = 1)]
    hash_concurrency: usize,
}

fn mode_from_flags(strict: bool, fail_on_warnings: bool) -> VerifyMode {
    if fail_on_warnings {
        VerifyMode::FailOnWarnings
    } else if strict {
        VerifyMode::Strict
    } else {
        VerifyMode::NonStrict
    }
}

fn wrap_as_records(raw: std::collections::BTreeMap<String, String>, purpose: &str) -> spine_core::KeyTable {
    raw.into_iter()
        .map(|(key_id, public_key_pem)| {
            let record = PublicKeyRecord {
                tenant_id: String::new(),
                key_id: key_id.clone(),
                public_key_pem,
                purpose: purpose.to_string(),
                server_governed: None,
                valid_from: None,
                revoked_at: None,
            };
            (key_id, record)
        })
        .collect()
}

fn load_trust() -> TrustInputs {
    let (config_trust, warnings) = match ConfigTrustInputs::from_env() {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "failed to read trust key environment variables");
            (ConfigTrustInputs::default(), Vec::new())
        }
    };
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    // config_trust.pricing_signers is read from SPINE_PRICING_SIGNER_KEYS
    // but has no counterpart on spine_verify::TrustInputs: no verify
    // operation performs a pricing-signature check, so there is nothing
    // to thread it into.
    TrustInputs {
        governance_roots: wrap_as_records(config_trust.governance_roots, "governance_root"),
        time_authorities: wrap_as_records(config_trust.time_authorities, "time_authority"),
    }
}

async fn run_verify(args: VerifyArgs, debug: bool) -> VerifyCliOutput {
    let kind = args.kind.kind();
    let mode = mode_from_flags(args.strict, args.fail_on_warnings);
    let opts = VerifyOptions {
        mode,
        hash_concurrency: args.hash_concurrency.max(1),
        trust: load_trust(),
        tool: ToolInfo {
            name: "spine-verify".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            commit: None,
        },
    };

    let is_zip = args.path.extension().and_then(|e| e.to_str()) == Some("zip");

    if debug {
        tracing::debug!(path = %args.path.display(), kind = ?kind, mode = ?mode, "starting verification");
    }

    if is_zip {
        match verify_bundle_zip(kind, &args.path, &opts) {
            Ok(output) => output,
            Err(e) => {
                let target = Target { kind: TargetKind::Zip, path: args.path.display().to_string() };
                VerifyCliOutput::new(opts.tool.clone(), mode, target, false, vec![(&e).into()], vec![])
            }
        }
    } else {
        verify_bundle_dir_async(kind, &args.path, &opts).await
    }
}

fn print_output(output: &VerifyCliOutput, format: FormatArg) {
    match format {
        FormatArg::Json => {
            let rendered = serde_json::to_string_pretty(output).expect("VerifyCliOutput always serializes");
            println!("{rendered}");
        }
        FormatArg::Text => {
            println!("{}: {}", if output.ok { "OK" } else { "FAILED" }, output.summary);
            for err in &output.errors {
                println!("  error: {} {}", err.code, err.path.as_deref().unwrap_or(""));
            }
            for warning in &output.warnings {
                println!("  warning: {} {}", warning.code, warning.path.as_deref().unwrap_or(""));
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("spine=debug")
    } else {
        EnvFilter::new("spine=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Commands::Verify(args) = cli.command;

    let format = args.format;
    let json_out = args.json_out.clone();

    let output = run_verify(args, cli.debug).await;

    print_output(&output, format);

    if let Some(path) = json_out {
        match serde_json::to_vec_pretty(&output) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    eprintln!("error: could not write --json-out file: {e}");
                    return ExitCode::from(EXIT_USAGE_ERROR);
                }
            }
            Err(e) => {
                eprintln!("error: could not serialize report: {e}");
                return ExitCode::from(EXIT_USAGE_ERROR);
            }
        }
    }

    ExitCode::from(output.exit_code() as u8)
}
