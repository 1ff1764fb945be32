//! Trust-input environment parsing and CLI config-file loading.
//!
//! A file-then-env-then-default load order with a hard/soft
//! `ConfigError`/`ConfigWarning` split, applied to the verifier's two
//! config surfaces: the trusted key maps it needs to check signatures
//! against, and the CLI's optional defaults file.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

/// Errors that can occur while loading trust inputs or CLI defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An environment variable was present but not valid JSON, or not a
    /// JSON object of string to string.
    #[error("environment variable {var} is invalid: {reason}")]
    EnvVarInvalid {
        /// Name of the offending variable.
        var: String,
        /// Human-readable parse error detail.
        reason: String,
    },
}

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recognized trust-key environment variable was absent or parsed to
    /// an empty map.
    EmptyTrustMap {
        /// Name of the environment variable.
        var: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::EmptyTrustMap { var } => {
                write!(f, "{var} is unset or empty; signatures under it will never verify")
            }
        }
    }
}

const GOVERNANCE_ROOT_KEYS_VAR: &str = "SPINE_GOVERNANCE_ROOT_KEYS";
const PRICING_SIGNER_KEYS_VAR: &str = "SPINE_PRICING_SIGNER_KEYS";
const TIME_AUTHORITY_KEYS_VAR: &str = "SPINE_TIME_AUTHORITY_KEYS";

/// The three trusted key maps named in the CLI's external interface, each
/// `keyId -> PEM-encoded public key`. These are raw maps, not yet wrapped
/// into `spine_core::PublicKeyRecord`s — callers decide tenant/purpose
/// framing when they hand these to `spine-verify`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustInputs {
    /// Keys trusted to sign governance policy documents and revocation lists.
    pub governance_roots: BTreeMap<String, String>,
    /// Keys trusted to sign pricing/contract artifacts.
    pub pricing_signers: BTreeMap<String, String>,
    /// Keys trusted to sign timestamp proofs.
    pub time_authorities: BTreeMap<String, String>,
}

impl TrustInputs {
    /// Load the three trusted key maps from their environment variables.
    /// Equivalent to [`load_trust_keys_from_env`], as a constructor.
    pub fn from_env() -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        load_trust_keys_from_env()
    }
}

fn parse_key_map(var: &str, raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    serde_json::from_str::<BTreeMap<String, String>>(raw).map_err(|e| ConfigError::EnvVarInvalid {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Read a single trust-key map from its environment variable, returning an
/// empty map (and a warning, pushed by the caller) if the variable is unset.
fn read_key_map_env(var: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_key_map(var, &raw),
        _ => Ok(BTreeMap::new()),
    }
}

/// Load the three trusted key maps from their environment variables
/// (`SPINE_GOVERNANCE_ROOT_KEYS`, `SPINE_PRICING_SIGNER_KEYS`,
/// `SPINE_TIME_AUTHORITY_KEYS`), each a JSON object of `keyId -> PEM`.
///
/// A missing or empty variable is not a hard error — it yields an empty map
/// plus an advisory [`ConfigWarning::EmptyTrustMap`], since some bundle
/// kinds never touch governance or time-authority checks at all. A present
/// but malformed variable is a hard [`ConfigError::EnvVarInvalid`].
pub fn load_trust_keys_from_env() -> Result<(TrustInputs, Vec<ConfigWarning>), ConfigError> {
    let mut warnings = Vec::new();

    let governance_roots = read_key_map_env(GOVERNANCE_ROOT_KEYS_VAR)?;
    if governance_roots.is_empty() {
        warnings.push(ConfigWarning::EmptyTrustMap { var: GOVERNANCE_ROOT_KEYS_VAR.to_string() });
    }
    let pricing_signers = read_key_map_env(PRICING_SIGNER_KEYS_VAR)?;
    if pricing_signers.is_empty() {
        warnings.push(ConfigWarning::EmptyTrustMap { var: PRICING_SIGNER_KEYS_VAR.to_string() });
    }
    let time_authorities = read_key_map_env(TIME_AUTHORITY_KEYS_VAR)?;
    if time_authorities.is_empty() {
        warnings.push(ConfigWarning::EmptyTrustMap { var: TIME_AUTHORITY_KEYS_VAR.to_string() });
    }

    Ok((TrustInputs { governance_roots, pricing_signers, time_authorities }, warnings))
}

/// Optional CLI defaults, loaded from a TOML file and overridable on the
/// command line. Every field is optional; an absent file is not an error.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct VerifyDefaults {
    /// Default `--hash-concurrency` when the flag is not passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_concurrency: Option<usize>,
    /// Default `--format` (`"json"` or `"text"`) when the flag is not passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Default `--strict` when the flag is not passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Load [`VerifyDefaults`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file; a missing file is a
///   hard [`ConfigError::FileNotFound`].
/// * If `path` is `None`, returns [`VerifyDefaults::default()`].
pub fn load_cli_config(path: Option<&Path>) -> Result<VerifyDefaults, ConfigError> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .map_err(|_| ConfigError::FileNotFound { path: p.display().to_string() })?;
            toml::from_str::<VerifyDefaults>(&content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
        }
        None => Ok(VerifyDefaults::default()),
    }
}

/// Merge CLI-supplied overrides over file-loaded defaults; `overlay` wins on
/// any field it sets.
pub fn merge_cli_config(base: VerifyDefaults, overlay: VerifyDefaults) -> VerifyDefaults {
    VerifyDefaults {
        hash_concurrency: overlay.hash_concurrency.or(base.hash_concurrency),
        format: overlay.format.or(base.format),
        strict: overlay.strict.or(base.strict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_trust_env() {
        std::env::remove_var(GOVERNANCE_ROOT_KEYS_VAR);
        std::env::remove_var(PRICING_SIGNER_KEYS_VAR);
        std::env::remove_var(TIME_AUTHORITY_KEYS_VAR);
    }

    #[test]
    fn missing_env_vars_yield_empty_maps_and_warnings() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_trust_env();
        let (keys, warnings) = load_trust_keys_from_env().unwrap();
        assert!(keys.governance_roots.is_empty());
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn valid_env_var_parses_into_map() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_trust_env();
        std::env::set_var(GOVERNANCE_ROOT_KEYS_VAR, r#"{"root-1": "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n"}"#);
        let (keys, warnings) = load_trust_keys_from_env().unwrap();
        assert_eq!(keys.governance_roots.len(), 1);
        assert!(keys.governance_roots.contains_key("root-1"));
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::EmptyTrustMap { var } if var == PRICING_SIGNER_KEYS_VAR)));
        clear_trust_env();
    }

    #[test]
    fn malformed_env_var_is_hard_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_trust_env();
        std::env::set_var(GOVERNANCE_ROOT_KEYS_VAR, "not json");
        let err = load_trust_keys_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarInvalid { .. }));
        clear_trust_env();
    }

    #[test]
    fn missing_cli_config_file_is_file_not_found() {
        let err = load_cli_config(Some(Path::new("/nonexistent/spine-verify.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn none_path_returns_defaults() {
        let cfg = load_cli_config(None).unwrap();
        assert_eq!(cfg, VerifyDefaults::default());
    }

    #[test]
    fn load_cli_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spine-verify.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "hash_concurrency = 4\nformat = \"text\"").unwrap();
        let cfg = load_cli_config(Some(&path)).unwrap();
        assert_eq!(cfg.hash_concurrency, Some(4));
        assert_eq!(cfg.format.as_deref(), Some("text"));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let base = VerifyDefaults { hash_concurrency: Some(1), format: Some("json".into()), strict: None };
        let overlay = VerifyDefaults { hash_concurrency: Some(8), format: None, strict: Some(true) };
        let merged = merge_cli_config(base, overlay);
        assert_eq!(merged.hash_concurrency, Some(8));
        assert_eq!(merged.format.as_deref(), Some("json"));
        assert_eq!(merged.strict, Some(true));
    }

    #[test]
    fn config_error_display_includes_detail() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));
        let e = ConfigError::EnvVarInvalid { var: "X".into(), reason: "bad".into() };
        assert!(e.to_string().contains("bad"));
    }
}
