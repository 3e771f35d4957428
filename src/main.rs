//! Builds the resource graph of a small EC2 deployment: the account's
//! default VPC, a security group open for ping and SSH, an Amazon Linux 2
//! instance and an A record pointing at the instance's public IP.
//!
//! Only read-only lookups are made against the AWS account. The result is a
//! CloudFormation template for the provisioning engine to apply.

mod checks;
mod config;
mod context;
mod gatherer;
mod stack;
mod template;
mod types;

use checks::graph::GraphChecksBuilder;
use clap::Parser;
use colored::Colorize;
use config::{StackConfigBuilder, DEFAULT_DOMAIN, DEFAULT_RECORD_NAME, DEFAULT_STACK_NAME};
use gatherer::aws::AwsContext;
use log::error;
use stack_types::StackGraph;
use std::error::Error;
use std::process::exit;

use crate::types::{Severity, Verifier};

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plan,
    Template,
    Json,
    Debug,
}

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Builds the EC2 basics stack and prints it for the provisioning engine. AWS configuration must be setup to access the target account.",
    long_about = "Builds the EC2 basics stack (default VPC, security group, instance, DNS record) and prints it for the provisioning engine. Only read-only lookups are made. AWS configuration must be setup to access the target account."
)]
struct Options {
    #[arg(short, long, env = "AWS_REGION")]
    region: String,
    #[arg(short, long, env = "ACCOUNT_ID")]
    account: String,
    #[arg(long, default_value = DEFAULT_STACK_NAME)]
    stack_name: String,
    #[arg(short, long, default_value = DEFAULT_DOMAIN)]
    domain: String,
    #[arg(long, default_value = DEFAULT_RECORD_NAME)]
    record_name: String,
    #[arg(long)]
    private_zone: bool,
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plan)]
    format: OutputFormat,
}

fn print_plan(graph: &StackGraph) -> bool {
    println!(
        "{} {} ({} in {})",
        "Stack".bold(),
        graph.stack_name,
        graph.environment.account,
        graph.environment.region
    );
    println!("  network        {} (looked up)", graph.network.vpc_id);
    println!(
        "  security group {} [{}]",
        graph.security_group.name,
        graph
            .security_group
            .ingress
            .iter()
            .map(|r| r.description())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for ni in graph.instance.network_interfaces.iter() {
        println!(
            "  instance       {} {} {} in {}",
            graph.instance.logical_id,
            graph.instance.instance_type,
            graph.instance.image.image_id,
            ni.subnet.subnet_id
        );
    }
    println!(
        "  dns record     {} {} -> {} (ttl {}s)",
        graph.dns_record.name,
        graph.dns_record.record_type,
        graph
            .dns_record
            .targets
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(","),
        graph.dns_record.ttl_seconds
    );
    let mut gcb = GraphChecksBuilder::default();
    let Ok(checks) = gcb.graph(graph).build() else {
        return false;
    };
    let mut passed = true;
    for res in checks.verify() {
        if res.severity == Severity::Critical {
            passed = false;
        }
        println!("{}", res);
    }
    passed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let options = Options::parse();
    env_logger::Builder::new()
        .filter_level(options.verbose.log_level_filter())
        .init();
    if options.region.is_empty() || options.account.is_empty() {
        eprintln!("Must set a region and an account to proceed.");
        exit(1);
    }

    let mut scb = StackConfigBuilder::default();
    let config = scb
        .region(options.region.clone())
        .account(options.account.clone())
        .stack_name(options.stack_name.clone())
        .domain_name(options.domain.clone())
        .record_name(options.record_name.clone())
        .private_zone(options.private_zone)
        .build()?;

    let sdk_config = gatherer::aws::aws_setup(&config.region).await;
    let context = AwsContext::new(&sdk_config);
    let graph = match stack::build_stack(&config, &context).await {
        Ok(graph) => graph,
        Err(e) => {
            error!("Building the stack failed: {}", e);
            eprintln!("{}", e.to_string().red());
            exit(1);
        }
    };

    match options.format {
        OutputFormat::Plan => {
            if !print_plan(&graph) {
                exit(2);
            }
        }
        OutputFormat::Template => {
            println!(
                "{}",
                serde_json::to_string_pretty(&template::synthesize(&graph))?
            )
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&graph)?)
        }
        OutputFormat::Debug => {
            println!("{}", &format!("{:#?}", graph))
        }
    }
    Ok(())
}
