//! keywarden - offline license generator.
//!
//! ## Usage
//!
//! ```bash
//! # Create the signing key (once per deployment)
//! keywarden --key-dir ./keys keygen --bits 4096
//!
//! # Hand the public key to verifiers
//! keywarden --key-dir ./keys public-key > public_key.pem
//!
//! # Issue a license
//! keywarden --key-dir ./keys issue \
//!     --licensed-to "Acme Corp" --contact "Wile E. Coyote" --email wile@acme.test \
//!     --valid-from 2025-01-01 --valid-to 2026-01-01 --tier professional \
//!     --out acme.license.json
//!
//! # Check it
//! keywarden --key-dir ./keys verify acme.license.json
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use keywarden::keys::pem;
use keywarden::policy::tiers;
use keywarden::protocol::envelope;
use keywarden::{
    EnvelopeVerifier, KeyPair, KeyStore, KeywardenConfig, KeywardenError, LicenseFeature,
    LicenseIssuer, LicenseRequest, LicenseTier, Licensee, PublicKeyResolver,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Offline RSA license generator.
#[derive(Parser)]
#[command(name = "keywarden")]
#[command(version = VERSION)]
#[command(about = "Issue and verify RS256-signed licenses")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Key store directory (default: platform data dir)
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// Password protecting the stored private key
    #[arg(long, global = true)]
    key_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the signing key pair
    Keygen {
        /// RSA modulus size (2048 or 4096)
        #[arg(long, default_value_t = keywarden::config::DEFAULT_KEY_SIZE_BITS)]
        bits: usize,

        /// Replace an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Print the public key as PEM
    PublicKey,

    /// Print the private key as PEM
    ExportPrivate {
        /// Encrypt the exported key with this password
        #[arg(long)]
        password: Option<String>,
    },

    /// Replace the signing key with one read from a PEM file
    ImportPrivate {
        /// PEM file (PKCS#8, encrypted PKCS#8 or PKCS#1)
        file: PathBuf,

        /// Password of an encrypted PEM
        #[arg(long)]
        password: Option<String>,
    },

    /// Issue a signed license
    Issue {
        /// Licensed organization
        #[arg(long)]
        licensed_to: String,

        /// Primary contact name
        #[arg(long)]
        contact: String,

        /// Primary contact email
        #[arg(long)]
        email: String,

        /// Secondary contact name
        #[arg(long)]
        secondary_contact: Option<String>,

        /// Secondary contact email
        #[arg(long)]
        secondary_email: Option<String>,

        /// Start of validity (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        valid_from: DateTime<Utc>,

        /// End of validity (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        valid_to: DateTime<Utc>,

        /// community, professional, enterprise or custom
        #[arg(long)]
        tier: LicenseTier,

        /// Feature to grant (repeatable); added to the tier defaults
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Monthly API call limit (tier default if omitted)
        #[arg(long)]
        api_calls: Option<u64>,

        /// Concurrent connection limit (tier default if omitted)
        #[arg(long)]
        connections: Option<u32>,

        /// Metadata entry as key=value (repeatable)
        #[arg(long = "metadata", value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Verify a license file
    Verify {
        /// License JSON file
        file: PathBuf,

        /// Verify against this public key instead of the key store
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("expected YYYY-MM-DD or RFC 3339, got {}", s))
}

fn parse_metadata(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

fn config(cli: &Cli) -> Result<KeywardenConfig, KeywardenError> {
    let mut config = match &cli.key_dir {
        Some(dir) => KeywardenConfig::for_directory(dir),
        None => KeywardenConfig::new("keywarden")?,
    };
    if let Some(password) = &cli.key_password {
        config = config.with_password(password.clone());
    }
    Ok(config)
}

fn read_file(path: &Path) -> Result<String, KeywardenError> {
    fs::read_to_string(path)
        .map_err(|e| KeywardenError::KeyIO(format!("Failed to read {}: {}", path.display(), e)))
}

fn write_output(out: Option<&Path>, text: &str) -> Result<(), KeywardenError> {
    match out {
        Some(path) => fs::write(path, text)
            .map_err(|e| KeywardenError::KeyIO(format!("Failed to write {}: {}", path.display(), e))),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn feature(name: &str, tier: LicenseTier) -> LicenseFeature {
    tiers::catalog()
        .iter()
        .find(|f| f.name == name)
        .cloned()
        .unwrap_or_else(|| LicenseFeature::new(name, "", tier))
}

fn run(cli: Cli) -> Result<bool, KeywardenError> {
    let config = config(&cli)?;

    match cli.command {
        Commands::Keygen { bits, force } => {
            let config = config.with_key_size(bits);
            let store = match KeyStore::load(&config) {
                Ok(store) if force => {
                    store.rotate()?;
                    store
                }
                Ok(_) => {
                    return Err(KeywardenError::ConfigError(format!(
                        "a key already exists in {}; pass --force to replace it",
                        config.key_store_dir.display()
                    )))
                }
                Err(KeywardenError::KeyNotFound(_)) => KeyStore::open(&config)?,
                Err(e) if force => {
                    tracing::warn!(error = %e, "Replacing unreadable key store");
                    KeyStore::create(&config, KeyPair::generate(bits)?)?
                }
                Err(e) => return Err(e),
            };
            eprintln!("Key directory: {}", config.key_store_dir.display());
            println!("{}", store.thumbprint()?);
        }

        Commands::PublicKey => {
            let store = KeyStore::load(&config)?;
            print!("{}", store.export_public_key_pem()?);
        }

        Commands::ExportPrivate { password } => {
            let store = KeyStore::load(&config)?;
            print!("{}", store.export_private_key_pem(password.as_deref())?.as_str());
        }

        Commands::ImportPrivate { file, password } => {
            let private_pem = read_file(&file)?;
            let thumbprint = match KeyStore::load(&config) {
                Ok(store) => {
                    store.import_private_key_pem(&private_pem, password.as_deref())?;
                    store.thumbprint()?
                }
                Err(KeywardenError::KeyNotFound(_)) => {
                    let key = pem::private_key_from_pem(&private_pem, password.as_deref())?;
                    KeyStore::create(&config, KeyPair::from_private_key(key)?)?.thumbprint()?
                }
                Err(e) => return Err(e),
            };
            println!("{}", thumbprint);
        }

        Commands::Issue {
            licensed_to,
            contact,
            email,
            secondary_contact,
            secondary_email,
            valid_from,
            valid_to,
            tier,
            features,
            api_calls,
            connections,
            metadata,
            out,
        } => {
            let mut licensee = Licensee::new(licensed_to, contact, email);
            licensee.secondary_contact_person = secondary_contact;
            licensee.secondary_contact_email = secondary_email;

            let mut request = LicenseRequest::new(licensee, valid_from, valid_to, tier);
            request.features = features.iter().map(|name| feature(name, tier)).collect();
            request.max_api_calls_per_month = api_calls;
            request.max_concurrent_connections = connections;
            request.metadata = metadata.into_iter().collect();

            let issuer = LicenseIssuer::from_config(&config)?;
            let issued = issuer.issue(&request)?;
            eprintln!("License id: {}", issued.payload.license_id);
            write_output(out.as_deref(), &issued.to_json()?)?;
        }

        Commands::Verify { file, public_key } => {
            let resolver: Arc<dyn PublicKeyResolver> = match public_key {
                Some(path) => Arc::new(pem::public_key_from_pem(&read_file(&path)?)?),
                None => Arc::new(KeyStore::load(&config)?),
            };
            let envelope = envelope::from_json(&read_file(&file)?)?;
            let result = EnvelopeVerifier::new(resolver).verify(&envelope, None);

            match (&result.reason, &result.payload) {
                (None, Some(payload)) => {
                    println!("VALID");
                    println!("  License:    {}", payload.license_id);
                    println!("  Licensed to: {}", payload.licensed_to);
                    println!("  Tier:       {}", payload.tier);
                    println!("  Valid:      {} .. {}", payload.valid_from, payload.valid_to);
                    let names: Vec<&str> = payload.features_included.iter().map(|f| f.name.as_str()).collect();
                    println!("  Features:   {}", names.join(", "));
                }
                (reason, _) => {
                    println!("INVALID: {}", reason.map(|r| r.code()).unwrap_or("UNKNOWN"));
                }
            }
            return Ok(result.valid);
        }
    }

    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
