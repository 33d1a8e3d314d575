mod auth;
mod body;
mod cast;
mod client;
mod config;
mod error;
mod operation;
mod request;
mod schema;
mod spec;
mod swagger;
mod values;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use heck::ToSnakeCase;
use std::collections::HashSet;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::auth::{AuthConfig, AuthType, run_command};
use crate::client::ApiClient;
use crate::config::{CONFIG_ENV, Config, DEFAULT_CONFIG_FILE, ProfileConfig};
use crate::operation::{Operation, Operations, ParameterList};
use crate::spec::Document;
use crate::values::RequestValues;

const RESERVED_NAMES: [&str; 4] = ["add", "rm", "list", "help"];

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    setup_logging(args.iter().any(|arg| arg == "--debug"))?;

    let config_path = config_path(&args);
    let config = Config::read_or_default(&config_path)?;

    // Only the selected profile's document is loaded.
    let catalog = match selected_profile(&args, &config) {
        Some((name, profile)) => {
            let ops = spec::load_operations(Path::new(&profile.spec_file))
                .with_context(|| format!("profile {name}"))?;
            Some((name, ops))
        }
        None => None,
    };
    let catalog = catalog.as_ref().map(|(name, ops)| (name.as_str(), ops));

    let matches = build_cli(&config, catalog).get_matches_from(&args);
    match matches.subcommand() {
        Some(("add", m)) => handle_add(config, &config_path, m),
        Some(("rm", m)) => handle_rm(config, &config_path, m),
        Some(("list", _)) => handle_list(&config),
        Some((name, m)) => {
            let profile = config
                .get(name)
                .ok_or_else(|| anyhow!("unknown profile {name:?}"))?;
            let (_, ops) = catalog.ok_or_else(|| anyhow!("profile {name} is not loaded"))?;
            handle_profile(profile, ops, m)
        }
        None => Ok(()),
    }
}

fn setup_logging(debug: bool) -> Result<()> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_env("RUST_LOG")
        .filter_level(level)
        .init();
    Ok(())
}

/// Resolves the config file: `--config`, then `OPCALL_CONFIG`, then the default.
fn config_path(args: &[String]) -> PathBuf {
    flag_value(args, "--config")
        .or_else(|| env::var(CONFIG_ENV).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
        .into()
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    args.iter().enumerate().find_map(|(i, arg)| {
        if arg == flag {
            args.get(i + 1).cloned()
        } else {
            arg.strip_prefix(&prefix).map(str::to_string)
        }
    })
}

/// Returns the profile named by the first positional argument, if any.
fn selected_profile<'a>(args: &[String], config: &'a Config) -> Option<(String, &'a ProfileConfig)> {
    let mut skip_value = false;
    for arg in args.iter().skip(1) {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--config" || arg == "--timeout" {
            skip_value = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return config.get(arg).map(|profile| (arg.clone(), profile));
    }
    None
}

fn build_cli(config: &Config, catalog: Option<(&str, &Operations)>) -> Command {
    let mut cmd = Command::new("opcall")
        .about("Call any HTTP API described by an OpenAPI document")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .help(format!(
                    "Config file (env: {CONFIG_ENV}, default: {DEFAULT_CONFIG_FILE})"
                )),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64))
                .help("HTTP timeout in seconds"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        );

    let auth_types: Vec<&str> = AuthType::ALL.iter().map(AuthType::as_str).collect();
    cmd = cmd.subcommand(
        Command::new("add")
            .about("Add a profile")
            .after_help(
                "The auth type, API key header and server URL are detected from the\n\
                 document unless given as options.",
            )
            .arg(Arg::new("profile").required(true))
            .arg(Arg::new("spec_file").required(true))
            .arg(
                Arg::new("auth")
                    .long("auth")
                    .value_name("CREDENTIALS")
                    .help("Auth credentials (access token or API key), sent with every request"),
            )
            .arg(
                Arg::new("auth_cmd")
                    .long("auth-cmd")
                    .value_name("COMMAND")
                    .help("Command run before every request to retrieve the credentials"),
            )
            .arg(
                Arg::new("auth_type")
                    .long("auth-type")
                    .value_name("TYPE")
                    .help(format!("Auth type. One of: {}", auth_types.join(", "))),
            )
            .arg(
                Arg::new("api_key_header")
                    .long("api-key-header")
                    .value_name("HEADER")
                    .help(format!("API key header. Defaults to {}", auth::DEFAULT_API_KEY_HEADER)),
            )
            .arg(
                Arg::new("server_url")
                    .long("server-url")
                    .value_name("URL")
                    .help("Server URL"),
            ),
    );
    cmd = cmd.subcommand(
        Command::new("rm")
            .about("Remove a profile")
            .arg(Arg::new("profile").required(true)),
    );
    cmd = cmd.subcommand(Command::new("list").about("List profiles"));

    for name in config.profiles() {
        if RESERVED_NAMES.contains(&name) {
            log::warn!("ignoring profile {name:?}: the name is reserved");
            continue;
        }
        let mut profile_cmd = Command::new(name.to_string())
            .about(format!("Run an operation of the {name} profile"))
            .disable_help_subcommand(true);
        if let Some((_, ops)) = catalog.filter(|(selected, _)| *selected == name) {
            let mut seen = HashSet::new();
            for op in ops {
                if !seen.insert(op.id.as_str()) {
                    log::warn!("skipping {} {}: duplicate operation id {}", op.method, op.path, op.id);
                    continue;
                }
                profile_cmd = profile_cmd.subcommand(operation_command(name, op));
            }
        }
        cmd = cmd.subcommand(profile_cmd);
    }

    cmd
}

fn operation_command(profile: &str, op: &Operation) -> Command {
    let mut usage = format!("opcall {profile} {}", op.id);
    for param in &op.parameters.path {
        usage.push_str(&format!(" <{}>", param.name.to_snake_case()));
    }
    usage.push_str(" [OPTIONS]");

    let mut cmd = Command::new(op.id.clone())
        .about(op.summary_with_flags())
        .override_usage(usage)
        .after_help(parameter_help(op))
        .arg(
            Arg::new("path_values")
                .value_name("PATH_VALUES")
                .num_args(0..)
                .action(ArgAction::Append)
                .help("Path parameter values, in order"),
        )
        .arg(
            Arg::new("header")
                .short('H')
                .long("header")
                .value_name("HEADER")
                .action(ArgAction::Append)
                .help("Header, as 'Name: Value'. Can be repeated"),
        )
        .arg(
            Arg::new("query")
                .short('q')
                .long("query")
                .value_name("QUERY")
                .help("Query string, e.g. 'filter[deleted]=true&page=2'"),
        )
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_name("BODY")
                .help("Body string, e.g. 'name=Shoe&tags=red,blue'"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print the response status and headers"),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the request instead of sending it"),
        );
    if !op.description.is_empty() {
        cmd = cmd.long_about(format!("{}\n\n{}", op.summary_with_flags(), op.description));
    }
    cmd
}

/// Lists the operation's parameters, grouped by location.
fn parameter_help(op: &Operation) -> String {
    let sections: [(&str, &ParameterList); 4] = [
        ("Path parameters", &op.parameters.path),
        ("Query parameters", &op.parameters.query),
        ("Header parameters", &op.parameters.header),
        ("Body parameters", &op.parameters.body),
    ];
    let mut out = Vec::new();
    for (title, params) in sections {
        if params.is_empty() {
            continue;
        }
        let mut section = format!("{title}:");
        for param in params {
            section.push_str(&format!("\n  {} <{}>", param.name_with_flags(), param.ty));
            if !param.description.is_empty() {
                section.push_str(&format!("\n      {}", param.description.replace('\n', "\n      ")));
            }
            if !param.enum_values.is_empty() {
                section.push_str(&format!("\n      Allowed values: {}", param.enum_values.join(", ")));
            }
            if let Some(default) = &param.default {
                section.push_str(&format!("\n      Default: {default}"));
            }
            if let Some(example) = &param.example {
                section.push_str(&format!("\n      Example: {example}"));
            }
        }
        out.push(section);
    }
    if op.has_body() {
        out.push(format!("Body format: {}", op.body_format));
    }
    out.join("\n\n")
}

fn handle_add(mut config: Config, config_path: &Path, matches: &ArgMatches) -> Result<()> {
    let profile = required_arg(matches, "profile")?;
    let spec_file = required_arg(matches, "spec_file")?;
    if RESERVED_NAMES.contains(&profile) {
        bail!("can't name a profile {profile:?}, please choose a different name");
    }
    let auth_type = optional_arg(matches, "auth_type");
    if !auth_type.is_empty() {
        auth_type.parse::<AuthType>()?;
    }

    let doc = Document::load(Path::new(spec_file))?;
    doc.operations()?;
    let (detected_type, detected_header) = doc.auth_defaults();

    let server_url = match optional_arg(matches, "server_url") {
        "" => doc.server_url().to_string(),
        url => url.to_string(),
    };
    let auth = AuthConfig {
        credentials: optional_arg(matches, "auth").to_string(),
        command: optional_arg(matches, "auth_cmd").to_string(),
        auth_type: match auth_type {
            "" => detected_type.to_string(),
            given => given.to_string(),
        },
        api_key_header: match optional_arg(matches, "api_key_header") {
            "" => detected_header,
            given => given.to_string(),
        },
    };
    config.insert(
        profile,
        ProfileConfig {
            spec_file: spec_file.to_string(),
            server_url,
            auth,
        },
    );
    config.write(config_path)?;
    write_stdout_line(&format!(
        "Added the {profile} profile to {}",
        config_path.display()
    ))
}

fn handle_rm(mut config: Config, config_path: &Path, matches: &ArgMatches) -> Result<()> {
    let profile = required_arg(matches, "profile")?;
    if config.remove(profile).is_none() {
        bail!("unknown profile {profile:?}");
    }
    config.write(config_path)?;
    write_stdout_line(&format!(
        "Removed the {profile} profile from {}",
        config_path.display()
    ))
}

fn handle_list(config: &Config) -> Result<()> {
    for profile in config.profiles() {
        write_stdout_line(profile)?;
    }
    Ok(())
}

fn handle_profile(profile: &ProfileConfig, ops: &Operations, matches: &ArgMatches) -> Result<()> {
    let Some((op_id, op_matches)) = matches.subcommand() else {
        return list_operations(ops);
    };
    let op = ops
        .by_id(op_id)
        .ok_or_else(|| anyhow!("unknown operation {op_id}"))?;

    let headers: Vec<String> = op_matches
        .get_many::<String>("header")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let path: Vec<String> = op_matches
        .get_many::<String>("path_values")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let values = RequestValues::parse(
        &headers,
        path,
        optional_arg(op_matches, "query"),
        optional_arg(op_matches, "body"),
    )?;

    let mut request = op.request(&profile.server_url, &values)?;
    request.authenticate(&profile.auth, run_command)?;
    if op_matches.get_flag("dry_run") {
        return write_stdout_line(&request.to_string());
    }

    let timeout = op_matches.get_one::<u64>("timeout").copied();
    let client = ApiClient::new(timeout)?;
    let response = client.execute(request, op_matches.get_flag("verbose"))?;
    write_stdout_line(&response.output)?;
    if response.status.as_u16() >= 400 {
        std::process::exit(1);
    }
    Ok(())
}

fn list_operations(ops: &Operations) -> Result<()> {
    let width = ops.iter().map(|op| op.id.len()).max().unwrap_or(0);
    for (i, tag) in ops.tags().into_iter().enumerate() {
        if i > 0 {
            write_stdout_line("")?;
        }
        write_stdout_line(if tag.is_empty() { "Other" } else { tag })?;
        for op in ops.by_tag(tag) {
            write_stdout_line(&format!("  {:width$}  {}", op.id, op.summary_with_flags()))?;
        }
    }
    Ok(())
}

fn required_arg<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{id} required"))
}

fn optional_arg<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or("")
}

fn write_stdout_line(value: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for chunk in [value.as_bytes(), b"\n"] {
        if let Err(err) = out.write_all(chunk) {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                std::process::exit(0);
            }
            return Err(err.into());
        }
    }
    Ok(())
}
