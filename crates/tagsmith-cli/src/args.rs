//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tagsmith")]
#[command(about = "Compile and render tag-based templates")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Template base directory [default: . or the config file's base_dir]"
    )]
    pub base: Option<PathBuf>,

    #[arg(short, long, global = true, help = "YAML engine configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for compiled artifacts")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Recompile even if an artifact exists")]
    pub no_cache: bool,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,
}

/// Template identity shared by every subcommand.
#[derive(Debug, ClapArgs)]
pub struct Target {
    #[arg(help = "Logical template name, e.g. blog/post")]
    pub name: String,

    #[arg(short, long, help = "Layout to wrap the template in")]
    pub layout: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile a template (if needed) and print the artifact path
    Compile {
        #[command(flatten)]
        target: Target,
    },

    /// Render a template to standard output
    Render {
        #[command(flatten)]
        target: Target,

        #[arg(long, help = "JSON file with template bindings")]
        vars: Option<PathBuf>,

        #[arg(
            short = 'V',
            long = "var",
            help = "Set a binding (key=value); JSON values are parsed"
        )]
        var: Vec<String>,
    },

    /// Print the template source merged with its layout
    Source {
        #[command(flatten)]
        target: Target,
    },
}
