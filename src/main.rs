#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use stackcat::*;
use std::process;

fn print_error_debug(e: &Error) {
    use std::env;
    // print causes of error if present
    if env::var("CI").is_ok() {
        // only print debug implementation rather than unwinding
        warn!("{:?}", e);
    } else {
        // normal case - unwind the error chain
        for e in e.iter().skip(1) {
            warn!("caused by: {}", e);
        }
    }
}

#[tokio::main]
async fn main() {
    let app = App::new("stackcat")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .global_settings(&[AppSettings::ColoredHelp])
        .about("Apply a small kubernetes stack in dependency order")
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .global(true)
            .help("Increase verbosity"))
        .arg(Arg::with_name("debug")
            .short("d")
            .long("debug")
            .global(true)
            .help("Adds line numbers to log statements"))
        .subcommand(SubCommand::with_name("up")
            .about("Create or update every resource, predecessors first"))
        .subcommand(SubCommand::with_name("destroy")
            .about("Delete every resource, successors first"))
        .subcommand(SubCommand::with_name("preview")
            .about("Print the manifests that would be applied"))
        .subcommand(SubCommand::with_name("graph")
            .arg(Arg::with_name("dot")
                .long("dot")
                .help("Generate dot output for graphviz"))
            .about("Print the resource dependency graph"))
        .subcommand(SubCommand::with_name("order")
            .arg(Arg::with_name("teardown")
                .long("teardown")
                .help("Print deletion order instead"))
            .about("Print the order resources are applied in"))
        .subcommand(SubCommand::with_name("config")
            .setting(AppSettings::SubcommandRequiredElseHelp)
            .about("Inspect stackcat.conf")
            .subcommand(SubCommand::with_name("show")
                .about("Show the resolved config"))
            .subcommand(SubCommand::with_name("verify")
                .about("Verify the config and the kubeconfig it points to")));

    // arg parse
    let args = app.get_matches();
    let name = args.subcommand_name().unwrap_or("stackcat").to_string();
    if let Err(e) = run(&args).await {
        error!("{} error: {}", name, e);
        print_error_debug(&e);
        process::exit(1);
    }
    process::exit(0);
}

async fn run(args: &ArgMatches<'_>) -> Result<()> {
    // initialise deps and set log default - always show INFO messages (+1)
    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(true)
        .line_numbers(args.is_present("debug"))
        .init()?;
    stackcat::init()?;

    // Ignore SIGPIPE errors to avoid having to use let _ = write! everywhere
    // See https://github.com/rust-lang/rust/issues/46016
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    // Dispatch arguments to internal handlers. Pass on handled result.
    dispatch_commands(args).await
}

fn void<T>(_x: T) {} // helper so that dispatch_commands can return Result<()>

/// Dispatch clap arguments to stackcat handlers
async fn dispatch_commands(args: &ArgMatches<'_>) -> Result<()> {
    let conf = Config::read_or_default()?;

    if args.subcommand_matches("up").is_some() {
        return stack::up(&conf).await.map(void);
    }
    else if args.subcommand_matches("destroy").is_some() {
        return stack::destroy(&conf).await.map(void);
    }
    else if args.subcommand_matches("preview").is_some() {
        return stack::preview(&conf);
    }
    else if let Some(a) = args.subcommand_matches("graph") {
        return stackcat::graph::generate(&conf, a.is_present("dot"));
    }
    else if let Some(a) = args.subcommand_matches("order") {
        return stackcat::graph::order(&conf, a.is_present("teardown"));
    }
    else if let Some(a) = args.subcommand_matches("config") {
        if a.subcommand_matches("show").is_some() {
            return conf.print().map_err(Error::from);
        }
        if a.subcommand_matches("verify").is_some() {
            conf.verify()?;
            conf.kubeconfig()?;
            info!("stackcat.conf is valid");
            return Ok(());
        }
    }
    unreachable!("Subcommand valid, but not implemented")
}
