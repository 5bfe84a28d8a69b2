mod cli;

use std::fmt::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use dt_dispatch::{Report, Validator};
use dt_model::{DynamicObject, VariantTable};

fn read_input(input: &str) -> anyhow::Result<String> {
    if input.starts_with("http://") || input.starts_with("https://") {
        debug!(url = input, "fetching schema");
        let response = reqwest::blocking::get(input)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("could not fetch {input}"))?;
        Ok(response.text()?)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("could not read {input}"))
    }
}

fn tag_of(table: &VariantTable, name: &str) -> anyhow::Result<dt_model::Tag> {
    table
        .tag_by_local_name(name)
        .ok_or_else(|| anyhow!("no variant named {name} in the target namespace"))
}

fn list_tags(table: &VariantTable) -> String {
    let mut out = String::new();
    for (tag, variant) in table.iter() {
        let base = variant
            .base
            .and_then(|b| table.name(b))
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let _ = writeln!(
            out,
            "{}\t{:?}\t{}\t{}",
            tag.index(),
            variant.kind,
            variant.name,
            base
        );
    }
    out
}

fn chain(table: &VariantTable, name: &str) -> anyhow::Result<String> {
    let tag = tag_of(table, name)?;
    let mut out = String::new();
    for ancestor in table.ancestors(tag) {
        if let Some(name) = table.name(ancestor) {
            let _ = writeln!(out, "{name}");
        }
    }
    Ok(out)
}

fn validate(table: Arc<VariantTable>, name: &str, value: &str) -> anyhow::Result<Report> {
    let tag = tag_of(&table, name)?;
    let validator = Validator::new(table)?;
    Ok(validator.validate(&DynamicObject::with_text(tag, value))?)
}

fn run(cli: cli::Cli) -> anyhow::Result<ExitCode> {
    let xsd = read_input(&cli.input)?;
    let options = roxmltree::ParsingOptions {
        allow_dtd: cli.allow_dtd,
        ..Default::default()
    };
    let xsd = roxmltree::Document::parse_with_options(&xsd, options)
        .with_context(|| format!("{} is not well-formed XML", cli.input))?;
    let table = Arc::new(dt_model::read_variant_table(&xsd, &cli.load_options())?);

    match &cli.command {
        cli::Command::Tags => print!("{}", list_tags(&table)),
        cli::Command::Chain { name } => print!("{}", chain(&table, name)?),
        cli::Command::Validate { name, value } => {
            let report = validate(table, name, value)?;
            for diagnostic in &report.diagnostics {
                println!("{diagnostic}");
            }
            if !report.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    run(cli::Cli::parse())
}
