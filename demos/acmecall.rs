// Copyright 2026 Acme Engineering

use std::net::SocketAddr;
use std::process;

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use tokio::net::TcpStream;

use acme_gateway::auth::Credential;
use acme_gateway::client::AcmeClient;
use acme_gateway::request::RequestEnvelope;

static APP: &str = "acmecall";
static DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2030;

pub fn parse_opts(app: &'static str) -> ArgMatches {
    Command::new(app)
        .about("Command-line tool for making an ACME RPC method call")
        .version(crate_version!())
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .action(ArgAction::Help),
        )
        .arg(
            Arg::new("host")
                .help("DNS name or IP address for remote server")
                .long("host")
                .short('h'),
        )
        .arg(
            Arg::new("port")
                .help("TCP port for remote server (Default: 2030)")
                .long("port")
                .short('p')
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("method")
                .help("Name of remote RPC method call")
                .long("method")
                .short('m')
                .required(true),
        )
        .arg(
            Arg::new("oemid")
                .help("OEM id of the calling credential")
                .long("oemid")
                .default_value("oem"),
        )
        .arg(
            Arg::new("productid")
                .help("Device id of the calling credential")
                .long("productid")
                .default_value("device"),
        )
        .arg(
            Arg::new("uid")
                .help("Unique id of the calling credential")
                .long("uid")
                .default_value("001"),
        )
        .arg(Arg::new("uri").help("URI for uriinfo").long("uri"))
        .arg(
            Arg::new("key")
                .help("Key to match against the URI (repeatable)")
                .long("key")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("limit")
                .help("Maximum number of categories returned")
                .long("limit")
                .value_parser(value_parser!(i32)),
        )
        .arg(
            Arg::new("seqnum")
                .help("Sequence number echoed by the server")
                .long("seqnum")
                .value_parser(value_parser!(i32)),
        )
        .arg(
            Arg::new("http")
                .help("Send the request as an HTTP POST")
                .long("http")
                .action(ArgAction::SetTrue),
        )
        .get_matches()
}

fn string_arg(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() {
    let matches = parse_opts(APP);
    let host = matches
        .get_one::<String>("host")
        .map(String::as_str)
        .unwrap_or(DEFAULT_HOST);
    let port = matches.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
    let addr = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .unwrap_or_else(|e| {
            eprintln!("Failed to parse host and port as valid socket address: {}", e);
            process::exit(1)
        });

    let credential = Credential::new(
        string_arg(&matches, "oemid"),
        string_arg(&matches, "productid"),
        string_arg(&matches, "uid"),
    );
    let mut request = RequestEnvelope::new(string_arg(&matches, "method"), credential);
    request.seqnum = matches.get_one::<i32>("seqnum").copied();
    request.uri = matches.get_one::<String>("uri").cloned();
    request.keys = matches
        .get_many::<String>("key")
        .map(|keys| keys.cloned().collect())
        .unwrap_or_default();
    request.limit = matches.get_one::<i32>("limit").copied();

    let stream = TcpStream::connect(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to connect to server: {}", e);
        process::exit(1)
    });

    let mut client = AcmeClient::new(stream).with_host(host);
    match client.call(&request, matches.get_flag("http")).await {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1)
        }
    }
}
