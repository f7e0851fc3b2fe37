//! # ucp-cart
//!
//! Command-line front end for UCP storefront checkout and daily exchange rates.
//!
//! ## Usage
//!
//! ```bash
//! # Optional: default JSON-RPC token and the Eximbank key
//! export UCP_AUTH_TOKEN=...
//! export EXIM_AUTH_KEY=...
//!
//! ucp-cart capabilities https://shop.example.com
//! ucp-cart rate USD KRW
//! ucp-cart customs 180 --shipping 25 --category apparel
//! ucp-cart checkout create https://shop.example.com --handle carry-on --currency USD
//! ```
//!
//! stdout carries only the JSON result; human-readable summaries and logs
//! go to stderr.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ucp_client::{
    CachePolicy, CapabilityInspector, CheckoutOrchestrator, ExchangeRateService, KoreaEximSource,
    UcpConfig,
};
use ucp_core::{parse_line_items, CustomsCategory, CustomsEstimate, PaymentSubmission, UcpError, UcpResult};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Cache directory for manifests, schemas and rates
    #[arg(long, global = true, env = "UCP_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// prefer-cache | network-first
    #[arg(long, global = true, value_parser = parse_cache_policy)]
    cache_policy: Option<CachePolicy>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarise a store's UCP checkout service
    Capabilities {
        store_url: String,
    },

    /// Daily exchange rate between two currencies
    Rate {
        from: String,
        to: String,

        /// YYYYMMDD (default: today in KST)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Full daily rate table
    Rates {
        /// YYYYMMDD (default: today in KST)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,

        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Estimate Korean import duty and VAT for a USD purchase
    Customs {
        price_usd: f64,

        #[arg(long, default_value_t = 0.0)]
        shipping: f64,

        /// footwear | apparel | general
        #[arg(long, default_value = "general")]
        category: String,

        /// KRW per USD (default: the daily quote)
        #[arg(long)]
        rate: Option<f64>,

        /// YYYYMMDD (default: today in KST)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Build a checkout line item from a product handle
    LineItem(ProductArgs),

    /// Checkout lifecycle
    #[command(subcommand)]
    Checkout(CheckoutCommand),
}

#[derive(Args)]
struct ProductArgs {
    store_url: String,
    handle: String,

    #[arg(long, default_value_t = 1)]
    quantity: u32,

    #[arg(long)]
    variant: Option<String>,
}

#[derive(Args)]
struct TokenArg {
    /// Overrides UCP_AUTH_TOKEN for this call
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum CheckoutCommand {
    /// Create a checkout from line-item JSON or a product handle
    Create {
        store_url: String,

        /// Line item object or array
        #[arg(long, conflicts_with = "handle", required_unless_present = "handle")]
        items: Option<String>,

        #[arg(long)]
        handle: Option<String>,

        #[arg(long, default_value_t = 1)]
        quantity: u32,

        #[arg(long)]
        variant: Option<String>,

        #[arg(long, default_value = "USD")]
        currency: String,

        #[command(flatten)]
        auth: TokenArg,
    },

    Get {
        store_url: String,
        checkout_id: String,
        #[command(flatten)]
        auth: TokenArg,
    },

    Update {
        store_url: String,
        checkout_id: String,
        /// Checkout object JSON
        #[arg(long)]
        payload: String,
        #[command(flatten)]
        auth: TokenArg,
    },

    Cancel {
        store_url: String,
        checkout_id: String,
        #[command(flatten)]
        auth: TokenArg,
    },

    Complete {
        store_url: String,
        checkout_id: String,
        /// Payment object JSON
        #[arg(long)]
        payment: Option<String>,
        #[command(flatten)]
        auth: TokenArg,
    },

    /// Complete from a wallet submission `{store_url, checkout_id, payment_token}`
    Pay {
        submission: String,
        #[command(flatten)]
        auth: TokenArg,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let mut config = UcpConfig::load().context("failed to load configuration")?;
    if let Some(dir) = cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(policy) = cli.cache_policy {
        config = config.with_cache_policy(policy);
    }
    debug!(cache_dir = %config.cache_dir.display(), "Configuration loaded");

    match cli.cmd {
        Command::Capabilities { store_url } => {
            let inspector = CapabilityInspector::new(&config)?;
            let report = inspector.inspect(&store_url).await;
            if let Ok(report) = &report {
                eprintln!("{}", report);
            }
            render(report.and_then(|r| Ok(serde_json::to_value(r)?)))
        }
        Command::Rate { from, to, date } => {
            let service = ExchangeRateService::<KoreaEximSource>::from_config(&config)?;
            let quote = service.quote(&from, &to, date).await;
            if let Ok(quote) = &quote {
                eprintln!(
                    "1 {} = {} {} ({})",
                    quote.from,
                    quote.formatted(),
                    quote.to,
                    quote.label
                );
            }
            render(quote.and_then(|q| Ok(serde_json::to_value(q)?)))
        }
        Command::Rates { date, lookback_days } => {
            let service = ExchangeRateService::<KoreaEximSource>::from_config(&config)?;
            let lookback = lookback_days.unwrap_or(config.fx_lookback_days);
            let daily = service.get_daily_rates(date, lookback).await;
            render(Ok(serde_json::to_value(daily)?))
        }
        Command::Customs {
            price_usd,
            shipping,
            category,
            rate,
            date,
        } => {
            let category = CustomsCategory::from_name(&category);
            let estimate = match rate {
                // An explicit rate needs no Eximbank key
                Some(rate) => CustomsEstimate::calculate(price_usd, shipping, category, rate),
                None => {
                    let service = ExchangeRateService::<KoreaEximSource>::from_config(&config)?;
                    service
                        .customs_estimate(price_usd, shipping, category, None, date)
                        .await
                }
            };
            if let Ok(estimate) = &estimate {
                eprintln!("{}", estimate);
            }
            render(estimate.and_then(|e| Ok(serde_json::to_value(e)?)))
        }
        Command::LineItem(args) => {
            let checkout = CheckoutOrchestrator::new(&config)?;
            let item = checkout
                .build_line_item_from_handle(
                    &args.handle,
                    &args.store_url,
                    args.quantity,
                    args.variant.as_deref(),
                )
                .await;
            render(item.and_then(|i| Ok(serde_json::to_value(i)?)))
        }
        Command::Checkout(cmd) => {
            let checkout = CheckoutOrchestrator::new(&config)?;
            render(run_checkout(&checkout, cmd).await)
        }
    }
}

async fn run_checkout(checkout: &CheckoutOrchestrator, cmd: CheckoutCommand) -> UcpResult<Value> {
    match cmd {
        CheckoutCommand::Create {
            store_url,
            items,
            handle,
            quantity,
            variant,
            currency,
            auth,
        } => {
            let outcome = match (items, handle) {
                (Some(items), _) => {
                    let line_items = parse_line_items(&items)?;
                    checkout
                        .create_checkout(&store_url, &line_items, &currency, auth.token.as_deref())
                        .await?
                }
                (None, Some(handle)) => {
                    checkout
                        .create_checkout_from_handle(
                            &store_url,
                            &handle,
                            quantity,
                            &currency,
                            variant.as_deref(),
                            auth.token.as_deref(),
                        )
                        .await?
                }
                (None, None) => {
                    return Err(UcpError::Validation("--items or --handle is required".to_string()))
                }
            };
            outcome.to_value()
        }
        CheckoutCommand::Get {
            store_url,
            checkout_id,
            auth,
        } => {
            checkout
                .get_checkout(&store_url, &checkout_id, auth.token.as_deref())
                .await
        }
        CheckoutCommand::Update {
            store_url,
            checkout_id,
            payload,
            auth,
        } => {
            let payload = parse_json_arg("payload", &payload)?;
            checkout
                .update_checkout(&store_url, &checkout_id, &payload, auth.token.as_deref())
                .await
        }
        CheckoutCommand::Cancel {
            store_url,
            checkout_id,
            auth,
        } => {
            checkout
                .cancel_checkout(&store_url, &checkout_id, auth.token.as_deref())
                .await
        }
        CheckoutCommand::Complete {
            store_url,
            checkout_id,
            payment,
            auth,
        } => {
            let payment = payment
                .map(|p| parse_json_arg("payment", &p))
                .transpose()?;
            checkout
                .complete_checkout(&store_url, &checkout_id, payment.as_ref(), auth.token.as_deref())
                .await
        }
        CheckoutCommand::Pay { submission, auth } => {
            let submission: PaymentSubmission = serde_json::from_str(&submission)
                .map_err(|e| UcpError::Validation(format!("invalid payment submission: {}", e)))?;
            checkout
                .complete_submission(&submission, auth.token.as_deref())
                .await
        }
    }
}

/// Print the result as JSON on stdout; failures are printed with their kind and exit non-zero
fn render(result: UcpResult<Value>) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            let body = json!({ "error": err.to_string(), "kind": err.kind() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(err.into())
        }
    }
}

fn parse_json_arg(name: &str, text: &str) -> UcpResult<Value> {
    serde_json::from_str(text)
        .map_err(|e| UcpError::Validation(format!("--{} is not valid JSON: {}", name, e)))
}

fn parse_date_arg(text: &str) -> Result<NaiveDate, String> {
    ucp_core::fx::parse_date(text).ok_or_else(|| format!("expected YYYYMMDD, got '{}'", text))
}

fn parse_cache_policy(text: &str) -> Result<CachePolicy, String> {
    text.parse().map_err(|e: UcpError| e.to_string())
}
