use clap::{Parser, Subcommand, ValueEnum};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ForeignBaseAction {
    Deny,
    Warn,
    Allow,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum UnsupportedFacetAction {
    Deny,
    Warn,
    Allow,
}

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(help = "The source file or URL")]
    pub input: String,

    #[arg(long, help = "Allow a XML Document Type Definition (DTD) to occur")]
    pub allow_dtd: bool,

    #[arg(long, value_enum, default_value = "deny")]
    pub foreign_base: ForeignBaseAction,

    #[arg(long, value_enum, default_value = "deny")]
    pub unsupported_facet: UnsupportedFacetAction,

    #[arg(long, help = "Attach simple types to the root instead of declaring them as variants")]
    pub no_simple_types: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every variant with its tag and base
    Tags,
    /// Print the ancestor chain of a variant, most specific first
    Chain {
        #[arg(help = "Local name of the variant")]
        name: String,
    },
    /// Check a lexical value against the facets of a variant and its ancestors
    Validate {
        #[arg(help = "Local name of the variant")]
        name: String,
        value: String,
    },
}

impl Cli {
    pub fn load_options(&self) -> dt_model::LoadOptions {
        dt_model::LoadOptions {
            foreign_base: match self.foreign_base {
                ForeignBaseAction::Deny => dt_model::ForeignBaseAction::Deny,
                ForeignBaseAction::Warn => dt_model::ForeignBaseAction::Warn,
                ForeignBaseAction::Allow => dt_model::ForeignBaseAction::Allow,
            },
            unsupported_facet: match self.unsupported_facet {
                UnsupportedFacetAction::Deny => dt_model::UnsupportedFacetAction::Deny,
                UnsupportedFacetAction::Warn => dt_model::UnsupportedFacetAction::Warn,
                UnsupportedFacetAction::Allow => dt_model::UnsupportedFacetAction::Allow,
            },
            simple_types: if self.no_simple_types {
                dt_model::IncludeSimpleTypes::No
            } else {
                dt_model::IncludeSimpleTypes::Yes
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validate_command_with_options() {
        let cli = Cli::parse_from([
            "dt-inspect",
            "gml.xsd",
            "--foreign-base",
            "warn",
            "--unsupported-facet",
            "allow",
            "--no-simple-types",
            "validate",
            "CurrencyType",
            "EUR",
        ]);
        assert_eq!(cli.input, "gml.xsd");
        let options = cli.load_options();
        assert_eq!(options.foreign_base, dt_model::ForeignBaseAction::Warn);
        assert_eq!(
            options.unsupported_facet,
            dt_model::UnsupportedFacetAction::Allow
        );
        assert_eq!(options.simple_types, dt_model::IncludeSimpleTypes::No);
        assert!(matches!(
            cli.command,
            Command::Validate { ref name, ref value } if name == "CurrencyType" && value == "EUR"
        ));
    }
}
