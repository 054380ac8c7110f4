//! crabrl-dts CLI - load a taxonomy, inspect hypercubes and labels

use anyhow::{anyhow, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crabrl_dts::drs::ResolvedMember;
use crabrl_dts::{
    CollectingSink, DrsResolver, DtsContext, DtsLoader, DtsSnapshot, DtsValidator, FileFetcher,
    LabelResolver, LoaderConfig, QName, QuickXmlParser, Severity, TypeSystem,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// XBRL taxonomy (DTS) resolver
#[derive(ClapParser)]
#[command(name = "crabrl-dts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover a DTS from entry schemas
    Load {
        /// Entry schema documents
        #[arg(required = true)]
        entries: Vec<PathBuf>,

        /// Write a snapshot of the loaded DTS
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Only read schemas
        #[arg(long)]
        no_linkbases: bool,

        /// Parse linkbases on one thread
        #[arg(long)]
        serial: bool,

        /// Run the dimensional validation passes
        #[arg(long)]
        validate: bool,

        /// Exit non-zero on any finding
        #[arg(long)]
        strict: bool,
    },

    /// Resolve the hypercubes of a primary item
    Hypercubes {
        /// Entry schema or snapshot (.json)
        source: PathBuf,

        /// Primary item as prefix:local or {namespace}local
        #[arg(short, long)]
        primary: String,

        /// Definition link role
        #[arg(short, long)]
        role: String,
    },

    /// Look up a concept label
    Label {
        /// Entry schema or snapshot (.json)
        source: PathBuf,

        /// Concept as prefix:local or {namespace}local
        #[arg(short, long)]
        concept: String,

        /// Label language
        #[arg(short, long, default_value = "en")]
        lang: String,

        /// Preferred label roles, most preferred first
        #[arg(long = "label-role")]
        roles: Vec<String>,

        /// Label link role
        #[arg(long, default_value = crabrl_dts::ns::STANDARD_LINK_ROLE)]
        link_role: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crabrl_dts=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            entries,
            snapshot,
            no_linkbases,
            serial,
            validate,
            strict,
        } => {
            let sink = Arc::new(CollectingSink::new());
            let config = LoaderConfig::default()
                .with_linkbases(!no_linkbases)
                .with_parallel(!serial);
            let start = Instant::now();
            let ctx = load_entries(&entries, config, sink.clone())?;
            let elapsed = start.elapsed();

            println!("{} DTS loaded", "✓".green().bold());
            println!("  Nodes: {}", ctx.node_count());
            println!("  Extended links: {}", ctx.links().len());
            println!("  Relationships: {}", ctx.relationships().len());
            println!("  Definition roles: {}", ctx.definition_roles().count());
            println!("  Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);

            if validate {
                let findings = DtsValidator::new(&ctx).validate()?;
                println!("  Validation findings: {}", findings.len());
            }

            print_diagnostics(&sink);

            if let Some(path) = snapshot {
                DtsSnapshot::capture(&ctx)
                    .save(&path)
                    .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
                println!("{} snapshot written to {}", "✓".green().bold(), path.display());
            }

            if strict && sink.count(Severity::Error) > 0 {
                std::process::exit(1);
            }
        }

        Commands::Hypercubes {
            source,
            primary,
            role,
        } => {
            let sink = Arc::new(CollectingSink::new());
            let ctx = open(&source, sink.clone())?;
            let primary = parse_concept(&ctx, &primary)?;

            let hypercubes = DrsResolver::new(&ctx).hypercubes_for(&primary, &role)?;
            if hypercubes.is_empty() {
                println!("{} {} has no hypercubes in {}", "✗".red().bold(), primary, role);
            }
            for cube in hypercubes {
                println!(
                    "{} {} [{}{}]",
                    "■".cyan(),
                    cube.hypercube.to_string().bold(),
                    cube.arcrole.uri().rsplit('/').next().unwrap_or(""),
                    if cube.closed { ", closed" } else { "" }
                );
                for dimension in &cube.tree.dimensions {
                    let default = dimension
                        .default
                        .as_ref()
                        .map(|d| format!(" (default {})", d))
                        .unwrap_or_default();
                    let kind = if dimension.typed { "typed" } else { "explicit" };
                    println!("  {} {} {}{}", "◆".yellow(), dimension.dimension, kind, default);
                    for domain in &dimension.domains {
                        print_member(domain, 2);
                    }
                }
            }
            print_diagnostics(&sink);
        }

        Commands::Label {
            source,
            concept,
            lang,
            roles,
            link_role,
        } => {
            let sink = Arc::new(CollectingSink::new());
            let ctx = open(&source, sink.clone())?;
            let concept = parse_concept(&ctx, &concept)?;
            let roles: Vec<&str> = if roles.is_empty() {
                vec![crabrl_dts::ns::LABEL_ROLE]
            } else {
                roles.iter().map(String::as_str).collect()
            };

            match LabelResolver::new(&ctx).describe(&concept, &roles, &lang, &link_role) {
                Some(label) => println!("{}", label),
                None => {
                    println!("{} no label for {}", "✗".red().bold(), concept);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_entries(
    entries: &[PathBuf],
    config: LoaderConfig,
    sink: Arc<CollectingSink>,
) -> Result<DtsContext> {
    let mut ctx = DtsContext::with_sink(sink);
    let fetcher = FileFetcher::new();
    let parser = QuickXmlParser;
    let locations: Vec<String> = entries.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    let refs: Vec<&str> = locations.iter().map(String::as_str).collect();
    DtsLoader::new(&mut ctx, &fetcher, &parser)
        .with_config(config)
        .load(&refs)
        .context("Failed to load DTS")?;
    Ok(ctx)
}

fn open(source: &Path, sink: Arc<CollectingSink>) -> Result<DtsContext> {
    if source.extension().is_some_and(|ext| ext == "json") {
        let snapshot = DtsSnapshot::load(source)
            .with_context(|| format!("Failed to read snapshot {}", source.display()))?;
        Ok(snapshot.restore(sink)?)
    } else {
        load_entries(&[source.to_path_buf()], LoaderConfig::default(), sink)
    }
}

fn parse_concept(ctx: &DtsContext, text: &str) -> Result<QName> {
    if let Some(rest) = text.strip_prefix('{') {
        let (namespace, local) = rest
            .split_once('}')
            .ok_or_else(|| anyhow!("malformed Clark name {}", text))?;
        return Ok(QName::new(namespace, local));
    }
    let (prefix, local) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected prefix:local, got {}", text))?;
    ctx.get_element(local, prefix)
        .map(|e| e.name.clone())
        .ok_or_else(|| anyhow!("unknown concept {}", text))
}

fn print_member(member: &ResolvedMember, depth: usize) {
    let marker = if member.usable { "·".normal() } else { "×".red() };
    println!("{}{} {}", "  ".repeat(depth), marker, member.member);
    for child in &member.children {
        print_member(child, depth + 1);
    }
}

fn print_diagnostics(sink: &CollectingSink) {
    let diagnostics = sink.diagnostics();
    if diagnostics.is_empty() {
        return;
    }
    println!(
        "  Diagnostics: {} errors, {} warnings",
        sink.count(Severity::Error),
        sink.count(Severity::Warning)
    );
    for diagnostic in diagnostics.iter().take(10) {
        let tag = match diagnostic.severity {
            Severity::Error => "ERROR:".red(),
            Severity::Warning => "WARN:".yellow(),
            Severity::Info => "INFO:".normal(),
        };
        println!("  {} {}", tag, diagnostic);
    }
    if diagnostics.len() > 10 {
        println!("  ... and {} more", diagnostics.len() - 10);
    }
}
