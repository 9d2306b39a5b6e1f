#![forbid(unsafe_code)]

//! Vaxholm CLI: WS-Security decoration and processing, SAMLP message
//! building and evaluation.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vaxholm::config::{
    self, AttributeQueryFile, AuthnRequestFile, RequestFile, ResponseEvaluatorFile, ResponseFile,
};
use vaxholm_core::Error;
use vaxholm_keys::loader::{load_certificate_file, load_private_key_file};
use vaxholm_keys::SimpleSecurityTokenResolver;
use vaxholm_samlp::{
    AttributeQueryEvaluator, AuthnRequestEvaluator, ContextValue, PolicyContext, RequestBuilder,
    ResponseBuilder, ResponseEvaluator, SimplePolicyContext,
};
use vaxholm_wss::{
    DecorationRequirements, ElementSelector, KeyReference, ProcessedToken, ProcessorOptions, WssDecorator,
    WssProcessor,
};

#[derive(Parser)]
#[command(
    name = "vaxholm",
    about = "Vaxholm: WS-Security and SAML protocol messages for SOAP services",
    version
)]
struct Cli {
    /// Verbose logging on stderr (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a WS-Security header to a SOAP message
    Decorate {
        /// Input SOAP message
        file: PathBuf,

        /// Sender private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Sender certificate (PEM or DER)
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Recipient certificate for encryption
        #[arg(long)]
        recipient: Option<PathBuf>,

        /// Sign the SOAP Body
        #[arg(long)]
        sign_body: bool,

        /// Encrypt the SOAP Body content
        #[arg(long)]
        encrypt_body: bool,

        /// Add a signed Timestamp
        #[arg(long)]
        timestamp: bool,

        /// How the signature refers to the sender certificate
        #[arg(long, value_enum, default_value_t = KeyReferenceArg::Bst)]
        key_reference: KeyReferenceArg,

        /// Target the security header at this actor/role
        #[arg(long)]
        actor: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify and decrypt the security header of a SOAP message
    Process {
        /// Input SOAP message
        file: PathBuf,

        /// Recipient private key (PEM or DER)
        #[arg(short = 'k', long, requires = "cert")]
        key: Option<PathBuf>,

        /// Recipient certificate matching --key
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// Certificate usable for signatures that reference it indirectly
        #[arg(long)]
        trust: Vec<PathBuf>,

        /// Process the header targeted at this actor/role
        #[arg(long)]
        actor: Option<String>,

        /// Write the processed document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build an AttributeQuery or AuthnRequest from a JSON configuration
    BuildRequest {
        /// JSON configuration file
        config: PathBuf,

        /// Context variable (NAME=VALUE)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a Response from a JSON configuration
    BuildResponse {
        /// JSON configuration file
        config: PathBuf,

        /// Context variable (NAME=VALUE)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate an inbound SAMLP message
    Evaluate {
        #[command(subcommand)]
        kind: EvaluateKind,
    },
}

#[derive(Subcommand)]
enum EvaluateKind {
    /// Evaluate an AttributeQuery (SAML 2.0 or 1.1)
    AttributeQuery {
        #[command(flatten)]
        common: EvaluateArgs,

        /// Private key for decrypting an EncryptedID
        #[arg(short = 'k', long, requires = "cert")]
        key: Option<PathBuf>,

        /// Certificate matching --key
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,
    },

    /// Evaluate an AuthnRequest; the file holds the message, redirect query or POST value
    AuthnRequest {
        #[command(flatten)]
        common: EvaluateArgs,
    },

    /// Evaluate a Response or a bare assertion
    Response {
        #[command(flatten)]
        common: EvaluateArgs,
    },
}

#[derive(clap::Args)]
struct EvaluateArgs {
    /// JSON configuration file
    config: PathBuf,

    /// Message to evaluate
    file: PathBuf,

    /// Context variable (NAME=VALUE)
    #[arg(long = "var")]
    vars: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyReferenceArg {
    Bst,
    Ski,
    Thumbprint,
    IssuerSerial,
}

impl From<KeyReferenceArg> for KeyReference {
    fn from(arg: KeyReferenceArg) -> Self {
        match arg {
            KeyReferenceArg::Bst => KeyReference::BinarySecurityToken,
            KeyReferenceArg::Ski => KeyReference::SubjectKeyIdentifier,
            KeyReferenceArg::Thumbprint => KeyReference::Thumbprint,
            KeyReferenceArg::IssuerSerial => KeyReference::IssuerSerial,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Decorate {
            file,
            key,
            cert,
            recipient,
            sign_body,
            encrypt_body,
            timestamp,
            key_reference,
            actor,
            output,
        } => cmd_decorate(
            file,
            key,
            cert,
            recipient,
            sign_body,
            encrypt_body,
            timestamp,
            key_reference,
            actor,
            output,
        ),

        Commands::Process {
            file,
            key,
            cert,
            trust,
            actor,
            output,
        } => cmd_process(file, key, cert, trust, actor, output),

        Commands::BuildRequest { config, vars, output } => cmd_build_request(config, vars, output),

        Commands::BuildResponse { config, vars, output } => cmd_build_response(config, vars, output),

        Commands::Evaluate { kind } => cmd_evaluate(kind),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── WS-Security ──────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn cmd_decorate(
    file: PathBuf,
    key: Option<PathBuf>,
    cert: Option<PathBuf>,
    recipient: Option<PathBuf>,
    sign_body: bool,
    encrypt_body: bool,
    timestamp: bool,
    key_reference: KeyReferenceArg,
    actor: Option<String>,
    output: Option<PathBuf>,
) -> Result<bool, Error> {
    let message = read_file(&file)?;

    let mut requirements = DecorationRequirements::new()
        .with_key_reference(key_reference.into())
        .with_timestamp(timestamp, timestamp && sign_body);
    if let Some(actor) = &actor {
        requirements = requirements.with_actor(actor);
    }
    if sign_body {
        let (Some(key), Some(cert)) = (key, cert) else {
            return Err(Error::Configuration("--sign-body needs --key and --cert".into()));
        };
        requirements = requirements
            .with_sender_certificate(load_certificate_file(&cert)?, load_private_key_file(&key)?)
            .sign(ElementSelector::Body);
    }
    if encrypt_body {
        let Some(recipient) = recipient else {
            return Err(Error::Configuration("--encrypt-body needs --recipient".into()));
        };
        requirements = requirements
            .with_recipient_certificate(load_certificate_file(&recipient)?)
            .encrypt(ElementSelector::Body);
    }

    let decorated = WssDecorator::new().decorate(&message, &requirements)?;
    info!(headers = decorated.headers.len(), "message decorated");
    write_output(output, decorated.xml.as_bytes())?;
    Ok(true)
}

fn cmd_process(
    file: PathBuf,
    key: Option<PathBuf>,
    cert: Option<PathBuf>,
    trust: Vec<PathBuf>,
    actor: Option<String>,
    output: Option<PathBuf>,
) -> Result<bool, Error> {
    let message = read_file(&file)?;
    let resolver = build_resolver(key.as_deref(), cert.as_deref(), &trust)?;

    let mut options = ProcessorOptions::new();
    if let Some(actor) = &actor {
        options = options.with_actor(actor);
    }
    let result = WssProcessor::with_options(&resolver, options).process(&message)?;

    if !result.has_security_header {
        eprintln!("No security header");
    }
    for signed in &result.signed_elements {
        let signer = signed
            .token
            .certificate()
            .map(|c| c.subject().to_owned())
            .unwrap_or_else(|| "symmetric key".to_owned());
        eprintln!(
            "Signed:    {{{}}}{} id={} by {signer}",
            signed.namespace,
            signed.local_name,
            signed.id.as_deref().unwrap_or("-"),
        );
    }
    for encrypted in &result.encrypted_elements {
        eprintln!(
            "Decrypted: {{{}}}{} ({}{})",
            encrypted.namespace,
            encrypted.local_name,
            encrypted.algorithm,
            if encrypted.content_only { ", content" } else { "" },
        );
    }
    for token in &result.tokens {
        if let ProcessedToken::UsernameToken { username, .. } = token {
            eprintln!("Username:  {username}");
        }
    }
    if let Some(timestamp) = &result.timestamp {
        eprintln!(
            "Timestamp: created={} expires={}",
            timestamp.created.as_deref().unwrap_or("-"),
            timestamp.expires.as_deref().unwrap_or("-"),
        );
    }

    write_output(output, result.document.as_bytes())?;
    Ok(true)
}

// ── SAMLP ────────────────────────────────────────────────────────────

fn cmd_build_request(config: PathBuf, vars: Vec<String>, output: Option<PathBuf>) -> Result<bool, Error> {
    let (file, base) = config::load::<RequestFile>(&config)?;
    let builder = RequestBuilder::new(file.into_config(&base)?)?;
    let mut ctx = context_from_vars(&vars)?;
    let xml = builder.build(&mut ctx)?;
    write_output(output, xml.as_bytes())?;
    Ok(true)
}

fn cmd_build_response(config: PathBuf, vars: Vec<String>, output: Option<PathBuf>) -> Result<bool, Error> {
    let (file, base) = config::load::<ResponseFile>(&config)?;
    let builder = ResponseBuilder::new(file.into_config(&base)?)?;
    let mut ctx = context_from_vars(&vars)?;
    let xml = builder.build(&mut ctx)?;
    write_output(output, xml.as_bytes())?;
    Ok(true)
}

fn cmd_evaluate(kind: EvaluateKind) -> Result<bool, Error> {
    let (evaluation, ctx) = match kind {
        EvaluateKind::AttributeQuery { common, key, cert } => {
            let (file, base) = config::load::<AttributeQueryFile>(&common.config)?;
            let mut evaluator = AttributeQueryEvaluator::new(file.into_config(&base)?)?;
            if key.is_some() {
                let resolver = build_resolver(key.as_deref(), cert.as_deref(), &[])?;
                evaluator = evaluator.with_resolver(Arc::new(resolver));
            }
            let (message, mut ctx) = evaluation_inputs(&common)?;
            (evaluator.evaluate(&message, &mut ctx), ctx)
        }
        EvaluateKind::AuthnRequest { common } => {
            let (file, _) = config::load::<AuthnRequestFile>(&common.config)?;
            let evaluator = AuthnRequestEvaluator::new(file.into_config()?)?;
            let (message, mut ctx) = evaluation_inputs(&common)?;
            (evaluator.evaluate(&message, &mut ctx), ctx)
        }
        EvaluateKind::Response { common } => {
            let (file, base) = config::load::<ResponseEvaluatorFile>(&common.config)?;
            let evaluator = ResponseEvaluator::new(file.into_config(&base)?)?;
            let (message, mut ctx) = evaluation_inputs(&common)?;
            (evaluator.evaluate(&message, &mut ctx), ctx)
        }
    };

    if !evaluation.is_none() {
        eprintln!("{evaluation}");
        return Ok(false);
    }
    for name in ctx.names() {
        println!("{name} = {}", describe(ctx.variable(name)));
    }
    Ok(true)
}

fn evaluation_inputs(args: &EvaluateArgs) -> Result<(String, SimplePolicyContext), Error> {
    let message = read_file(&args.file)?;
    Ok((message.trim().to_owned(), context_from_vars(&args.vars)?))
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(|e| Error::Other(format!("{}: {e}", p.display()))),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| Error::Other(format!("stdout: {e}")))
        }
    }
}

fn build_resolver(
    key: Option<&Path>,
    cert: Option<&Path>,
    trust: &[PathBuf],
) -> Result<SimpleSecurityTokenResolver, Error> {
    let mut resolver = SimpleSecurityTokenResolver::new();
    if let (Some(key), Some(cert)) = (key, cert) {
        resolver.add_key_pair(load_certificate_file(cert)?, load_private_key_file(key)?);
    }
    for path in trust {
        resolver.add_certificate(load_certificate_file(path)?);
    }
    Ok(resolver)
}

fn context_from_vars(vars: &[String]) -> Result<SimplePolicyContext, Error> {
    let mut ctx = SimplePolicyContext::new();
    for spec in vars {
        let Some((name, value)) = spec.split_once('=') else {
            return Err(Error::Configuration(format!("expected NAME=VALUE: {spec}")));
        };
        ctx.set_variable(name, Some(ContextValue::text(value)));
    }
    Ok(ctx)
}

fn describe(value: Option<&ContextValue>) -> String {
    match value {
        None => "<unset>".to_owned(),
        Some(ContextValue::Text(s)) => s.clone(),
        Some(ContextValue::Texts(list)) => format!("[{}]", list.join(", ")),
        Some(ContextValue::Element(_)) => "<element>".to_owned(),
        Some(ContextValue::Elements(list)) => format!("<{} elements>", list.len()),
        Some(ContextValue::Certificate(cert)) => cert.subject().to_owned(),
        Some(ContextValue::Certificates(list)) => {
            let subjects: Vec<&str> = list.iter().map(|c| c.subject()).collect();
            format!("[{}]", subjects.join(", "))
        }
        Some(ContextValue::Bool(b)) => b.to_string(),
        Some(ContextValue::Int(i)) => i.to_string(),
    }
}
