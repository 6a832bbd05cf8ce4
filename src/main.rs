use anyhow::{anyhow, bail, Context};
use rlz_client::ping::protocol::MAX_CGI_LENGTH;
use rlz_client::ping::transport::HttpTransport;
use rlz_client::{
    AccessPoint, CappedString, ClientConfig, Event, PingOutcome, PingRequest, Product, RlzClient,
};
use std::io::Read;
use std::path::PathBuf;

const USAGE: &str = "\
Usage: rlz [--config <file>] [--owner <name|machine>] <command> [args]

Commands:
  get <AP>                          print the RLZ of an access point
  set <AP> <value>                  store an RLZ (empty value clears it)
  record <P> <AP> <E> [--stateful]  record a product event
  events <P>                        print pending events as CGI
  params <AP>...                    print the ping parameters
  ping <P> --signature <s> [--brand <b>] [--pid <id>] [--lang <hl>]
       [--no-machine-id] [--force] [AP...]
                                    send a financial ping
  parse <P> <file|->                apply a ping response
  clear <P> [AP...]                 remove all state of a product
  dcc [value]                       print or set the machine deal code
  machine-id                        print the machine id
  grant-access                      open shared state to all local accounts";

fn main() -> anyhow::Result<()> {
    let level = std::env::var("RLZ_LOG")
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    let mut owner_name: Option<String> = None;
    let mut rest: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(value_of(&args, i)?));
                i += 2;
            }
            "--owner" => {
                owner_name = Some(value_of(&args, i)?.to_string());
                i += 2;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }

    let Some((command, command_args)) = rest.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let mut config = ClientConfig::load(config_path.as_deref())?;
    if owner_name.is_some() {
        config.owner = owner_name;
    }
    let owner = config.owner_id();
    let client = RlzClient::from_config(&config);
    tracing::debug!("Using store {} as {}", config.store_dir.display(), owner);

    match command.as_str() {
        "get" => {
            let point: AccessPoint = arg(command_args, 0, "access point")?.parse()?;
            match client.access_point_rlz(point, &owner)? {
                Some(rlz) => println!("{}", rlz),
                None => bail!("no RLZ stored for {}", point),
            }
        }
        "set" => {
            let point: AccessPoint = arg(command_args, 0, "access point")?.parse()?;
            let value = command_args.get(1).map(String::as_str).unwrap_or_default();
            client.set_access_point_rlz(point, value, &owner)?;
        }
        "record" => {
            let product: Product = arg(command_args, 0, "product")?.parse()?;
            let point: AccessPoint = arg(command_args, 1, "access point")?.parse()?;
            let event: Event = arg(command_args, 2, "event")?.parse()?;
            if command_args.iter().any(|a| a == "--stateful") {
                client.record_stateful_event(product, point, event, &owner)?;
            } else {
                client.record_product_event(product, point, event, &owner)?;
            }
        }
        "events" => {
            let product: Product = arg(command_args, 0, "product")?.parse()?;
            let mut out = CappedString::with_capacity(MAX_CGI_LENGTH + 1);
            client.product_events_as_cgi(product, &owner, &mut out)?;
            println!("{}", out.as_str());
        }
        "params" => {
            let points = parse_points(command_args)?;
            let mut out = CappedString::with_capacity(MAX_CGI_LENGTH + 1);
            client.ping_params(&points, &owner, &mut out)?;
            println!("{}", out.as_str());
        }
        "ping" => {
            let product: Product = arg(command_args, 0, "product")?.parse()?;
            let (request, force) = parse_ping_request(&command_args[1..])?;
            let transport = HttpTransport::from_config(&config)?;
            let outcome = client.send_financial_ping(product, &request, &owner, &transport, force)?;
            report(&outcome);
        }
        "parse" => {
            let product: Product = arg(command_args, 0, "product")?.parse()?;
            let source = arg(command_args, 1, "response file")?;
            let response = read_response(source)?;
            let outcome = client.parse_financial_ping_response(product, &response, &owner)?;
            report(&outcome);
        }
        "clear" => {
            let product: Product = arg(command_args, 0, "product")?.parse()?;
            let points = parse_points(&command_args[1..])?;
            client.clear_product_state(product, &points, &owner)?;
        }
        "dcc" => match command_args.first() {
            Some(value) => client.set_machine_deal_code(value)?,
            None => match client.machine_deal_code()? {
                Some(dcc) => println!("{}", dcc),
                None => bail!("no deal code stored"),
            },
        },
        "machine-id" => println!("{}", client.machine_id()?),
        "grant-access" => {
            if client.ensure_broad_access()? {
                tracing::info!("Access widened under {}", config.store_dir.display());
            } else {
                tracing::info!("Access was already broad");
            }
        }
        other => {
            eprintln!("Unknown command '{}'\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn value_of(args: &[String], i: usize) -> anyhow::Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", args[i]))
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing {}", what))
}

fn parse_points(args: &[String]) -> anyhow::Result<Vec<AccessPoint>> {
    args.iter()
        .map(|code| code.parse::<AccessPoint>().map_err(Into::into))
        .collect()
}

fn parse_ping_request(args: &[String]) -> anyhow::Result<(PingRequest, bool)> {
    let mut request = PingRequest::default();
    let mut force = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--signature" => {
                request.signature = value_of(args, i)?.to_string();
                i += 2;
            }
            "--brand" => {
                request.brand = value_of(args, i)?.to_string();
                i += 2;
            }
            "--pid" => {
                request.product_id = value_of(args, i)?.to_string();
                i += 2;
            }
            "--lang" => {
                request.language = value_of(args, i)?.to_string();
                i += 2;
            }
            "--no-machine-id" => {
                request.exclude_machine_id = true;
                i += 1;
            }
            "--force" => {
                force = true;
                i += 1;
            }
            code => {
                request.points.push(code.parse()?);
                i += 1;
            }
        }
    }

    if request.signature.is_empty() {
        bail!("--signature is required");
    }
    Ok((request, force))
}

fn read_response(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut response = String::new();
        std::io::stdin().read_to_string(&mut response)?;
        return Ok(response);
    }
    std::fs::read_to_string(source).with_context(|| format!("cannot read {}", source))
}

fn report(outcome: &PingOutcome) {
    match outcome {
        PingOutcome::EmptyAccepted => tracing::info!("Server had nothing to apply"),
        PingOutcome::Applied(changes) => tracing::info!(
            "Applied: {} rlz set, {} events cleared, {} stateful, dcc updated: {}",
            changes.rlzs_set,
            changes.events_cleared,
            changes.stateful_events_recorded,
            changes.deal_code_updated
        ),
    }
}
