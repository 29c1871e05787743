use anyhow::Result;
use clap::Parser;
use log::debug;
use pkgfeed::commands;
use pkgfeed::compat::{RequestContext, negotiate};
use pkgfeed::protocol::{SearchQuery, UpdatesQuery};
use pkgfeed::runtime::RealRuntime;
use pkgfeed::service::FeedService;
use pkgfeed::settings::FeedSettings;
use std::path::PathBuf;
use std::sync::Arc;

/// pkgfeed - private package feed
///
/// Index a directory of package archives and answer search, listing and
/// update queries against it.
///
/// Examples:
///   pkgfeed push ./Contoso.Json.1.2.0.pkg
///   pkgfeed updates --ids "Contoso.Json|Fabrikam" --versions "1.0.0|2.1.0"
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGFEED_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Packages root directory (overrides config; also via PKGFEED_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "PKGFEED_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub packages_root: Option<PathBuf>,

    /// JSON settings file (defaults to <config dir>/pkgfeed/config.json)
    #[arg(long = "config", short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Client protocol version queries are answered for (e.g. 2.0.0)
    #[arg(long = "semver-level", value_name = "VERSION", global = true)]
    pub semver_level: Option<String>,

    /// Replace existing versions on push
    #[arg(long, global = true)]
    pub allow_overwrite: bool,

    /// Delist instead of deleting on delete
    #[arg(long, global = true)]
    pub enable_delisting: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Publish a package file
    Push(PushArgs),

    /// Unpublish a package version
    Delete(PackageArgs),

    /// Make a delisted package version visible again
    Relist(PackageArgs),

    /// List all packages
    List,

    /// Search packages by id, title, description or tags
    Search(SearchArgs),

    /// List the versions of one package
    Find(FindArgs),

    /// Show available updates for installed packages
    Updates(UpdatesArgs),

    /// Print the location of a package file
    Download(PackageArgs),

    /// Rebuild the index from storage
    Rescan,

    /// Rescan whenever storage changes, until Ctrl-C
    Watch,
}

#[derive(clap::Args, Debug)]
pub struct PushArgs {
    /// Package file to publish
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Package id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Package version
    #[arg(value_name = "VERSION")]
    pub version: String,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Search term (matches everything when omitted)
    #[arg(value_name = "TERM")]
    pub term: Option<String>,

    /// Target frameworks, separated by '|'
    #[arg(long, value_name = "FRAMEWORKS", default_value = "")]
    pub framework: String,

    /// Include prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Include delisted versions (for clients that understand delisting)
    #[arg(long)]
    pub delisted: bool,
}

#[derive(clap::Args, Debug)]
pub struct FindArgs {
    /// Package id
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdatesArgs {
    /// Installed package ids, separated by '|'
    #[arg(long, value_name = "IDS")]
    pub ids: String,

    /// Installed versions, separated by '|'
    #[arg(long, value_name = "VERSIONS")]
    pub versions: String,

    /// Version constraints, separated by '|'
    #[arg(long, value_name = "CONSTRAINTS", default_value = "")]
    pub constraints: String,

    /// Target frameworks, separated by '|'
    #[arg(long, value_name = "FRAMEWORKS", default_value = "")]
    pub frameworks: String,

    /// Include prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Show every newer version, not just the highest
    #[arg(long)]
    pub all_versions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = RealRuntime;
    let mut settings = FeedSettings::load(&runtime, cli.config.as_deref())?;
    if let Some(root) = cli.packages_root {
        settings.packages_path = Some(root);
    }
    settings.allow_overwrite |= cli.allow_overwrite;
    settings.enable_delisting |= cli.enable_delisting;

    let context = RequestContext {
        protocol_version: cli.semver_level,
        user_agent: None,
    };
    let compatibility = negotiate(&context);
    debug!("Answering as a {} client", compatibility);

    let service = FeedService::open(runtime, settings)?;
    let json = cli.json;

    match cli.command {
        Commands::Push(args) => commands::push(&runtime, &service, &args.file, json)?,
        Commands::Delete(args) => commands::delete(&service, &args.id, &args.version)?,
        Commands::Relist(args) => commands::relist(&service, &args.id, &args.version)?,
        Commands::List => commands::list(&service, compatibility, json)?,
        Commands::Search(args) => {
            let query = SearchQuery::from_wire(
                args.term.as_deref(),
                &args.framework,
                args.prerelease,
                args.delisted,
            );
            commands::search(&service, &query, compatibility, json)?
        }
        Commands::Find(args) => commands::find(&service, &args.id, compatibility, json)?,
        Commands::Updates(args) => {
            let query = UpdatesQuery::from_wire(
                &args.ids,
                &args.versions,
                args.prerelease,
                args.all_versions,
                &args.frameworks,
                &args.constraints,
            );
            commands::updates(&service, &query, compatibility, json)?
        }
        Commands::Download(args) => commands::download(&service, &args.id, &args.version, json)?,
        Commands::Rescan => commands::rescan(&service, json)?,
        Commands::Watch => commands::watch(Arc::new(service)).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_push_parsing() {
        let cli = Cli::try_parse_from(["pkgfeed", "push", "foo.pkg"]).unwrap();
        match cli.command {
            Commands::Push(args) => assert_eq!(args.file, PathBuf::from("foo.pkg")),
            _ => panic!("Expected Push command"),
        }
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "pkgfeed",
            "list",
            "--root",
            "/srv/feed",
            "--semver-level",
            "2.0.0",
            "--json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.packages_root, Some(PathBuf::from("/srv/feed")));
        assert_eq!(cli.semver_level.as_deref(), Some("2.0.0"));
        assert!(cli.json);
    }

    #[test]
    fn test_cli_search_parsing() {
        let cli = Cli::try_parse_from([
            "pkgfeed",
            "search",
            "json",
            "--framework",
            "net45|net6.0",
            "--prerelease",
        ])
        .unwrap();
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.term.as_deref(), Some("json"));
                assert_eq!(args.framework, "net45|net6.0");
                assert!(args.prerelease);
                assert!(!args.delisted);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_updates_parsing() {
        let cli = Cli::try_parse_from([
            "pkgfeed",
            "updates",
            "--ids",
            "A|B",
            "--versions",
            "1.0|2.0",
            "--all-versions",
        ])
        .unwrap();
        match cli.command {
            Commands::Updates(args) => {
                assert_eq!(args.ids, "A|B");
                assert_eq!(args.versions, "1.0|2.0");
                assert_eq!(args.constraints, "");
                assert!(args.all_versions);
                assert!(!args.prerelease);
            }
            _ => panic!("Expected Updates command"),
        }
    }

    #[test]
    fn test_cli_delete_requires_version() {
        assert!(Cli::try_parse_from(["pkgfeed", "delete", "Foo"]).is_err());
    }
}
