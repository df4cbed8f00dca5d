use amlak::rest_types::{CreateReminderRequest, DealKind, EstateFilter, Timestamp};
use amlak::{AmlakClient, AssetKind, SessionTokens, TokenStore, UploadEvent, commission};
use anyhow::Result;
use autumnus::{FormatterOption, Options, highlight, themes};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{ArgValueCompleter, CompletionCandidate};
use futures::StreamExt;
use iocraft::prelude::*;
use std::{
    io::{self, Write},
    path::PathBuf,
    time::SystemTime,
};
use tokio::{runtime::Handle, sync::watch};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::ui::{
    CategoryList, CommissionBreakdown, ConfigHeader, ErrorMessage, EstateDetail, EstateList,
    InputPrompt, ProgressBar, ReminderList, RequestList, SuccessMessage, format_toman,
};

mod config;
mod ui;

const DEFAULT_AMLAK_BASE_URL: &str = "https://api.amlak.app";

#[derive(Parser)]
#[command(name = "amlak")]
#[command(version)]
#[command(about = "A command line client for the Amlak real-estate marketplace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a phone number; OTP flow unless --password is given
    Login {
        phone: String,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Search listings
    Estates {
        #[arg(short, long)]
        city: Option<String>,
        #[arg(long, add = ArgValueCompleter::new(category_completer))]
        category: Option<String>,
        /// Deal kind: sale or rent
        #[arg(short, long)]
        kind: Option<DealKind>,
        #[arg(long)]
        min_price: Option<u64>,
        #[arg(long)]
        max_price: Option<u64>,
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Inspect one listing
    Estate {
        id: Uuid,
        /// Print the raw listing as highlighted JSON
        #[arg(long)]
        json: bool,
    },
    /// List estate categories
    Categories,
    /// Owner reminders
    Reminders {
        #[command(subcommand)]
        command: ReminderCommands,
    },
    /// Visit/purchase requests submitted by users
    Requests,
    /// Upload an asset in 5 MiB chunks; Ctrl-C cancels
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Asset classification: gallery, document or plan
        #[arg(short, long, default_value = "gallery")]
        kind: AssetKind,
    },
    /// Brokerage commission calculator
    Commission {
        #[command(subcommand)]
        command: CommissionCommands,
    },
    /// Configure amlak interactively
    Config,
    /// Store a session token pair in the OS keyring
    SetToken {
        access_token: String,
        refresh_token: String,
    },
}

#[derive(Subcommand)]
enum ReminderCommands {
    List,
    /// Add a reminder due after the given offset (e.g. 3d, 12h)
    Add {
        title: String,
        #[arg(long = "in")]
        offset: humantime::Duration,
    },
}

#[derive(Subcommand)]
enum CommissionCommands {
    /// Sale commission for a transaction amount in Toman
    Sale {
        price: f64,
        /// Negotiated fractional rate (e.g. 0.01) instead of the statutory
        /// tiered rate
        #[arg(short, long)]
        rate: Option<f64>,
    },
    /// Rent commission from rahn (deposit) and ejareh (monthly rent)
    Rent { deposit: f64, monthly_rent: f64 },
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    rt.block_on(async {
        match cli.command {
            Commands::Config => interactive_config(),
            Commands::Logout => {
                config::clear_session()?;
                element!(SuccessMessage(message: "Logged out".to_string())).print();
                Ok(())
            }
            Commands::SetToken {
                access_token,
                refresh_token,
            } => {
                config::store_session(&SessionTokens {
                    access: access_token,
                    refresh: refresh_token,
                })?;
                println!("Session tokens stored for use with amlak");
                Ok(())
            }
            Commands::Commission { command } => {
                print_commission(command);
                Ok(())
            }
            requires_backend => {
                let config = config::read_config()?;
                let client =
                    AmlakClient::new(config.amlak_base_url, TokenStore::new(config.session));
                let default_city = config.default_city.clone();

                match requires_backend {
                    Commands::Login { phone, password } => login(&client, phone, password).await,
                    Commands::Estates {
                        city,
                        category,
                        kind,
                        min_price,
                        max_price,
                        page,
                    } => {
                        let filter = EstateFilter {
                            city: city.or(default_city),
                            category,
                            deal_kind: kind,
                            min_price,
                            max_price,
                            page,
                        };
                        list_estates(&client, &filter).await
                    }
                    Commands::Estate { id, json } => show_estate(&client, id, json).await,
                    Commands::Categories => list_categories(&client).await,
                    Commands::Reminders { command } => reminders(&client, command).await,
                    Commands::Requests => list_requests(&client).await,
                    Commands::Upload { file, kind } => upload_asset(&client, file, kind).await,
                    _ => panic!("This state should be unreachable"),
                }
            }
        }
    })
}

async fn login(client: &AmlakClient, phone: String, password: Option<String>) -> Result<()> {
    let session = match password {
        Some(password) => client.login_with_password(&phone, &password).await?,
        None => {
            client.send_otp(&phone).await?;
            let code = read_input(
                "Verification code",
                None,
                Some("The one-time code sent to your phone"),
            )?;
            client.verify_otp(&phone, &code).await?
        }
    };

    config::store_session(&session)?;
    element!(SuccessMessage(message: format!("Logged in as {}", phone))).print();
    Ok(())
}

async fn list_estates(client: &AmlakClient, filter: &EstateFilter) -> Result<()> {
    let estates = client.list_estates(filter).await?;
    if estates.is_empty() {
        println!("No listings matched");
        return Ok(());
    }
    element!(EstateList(estates: estates)).print();
    Ok(())
}

async fn show_estate(client: &AmlakClient, id: Uuid, json: bool) -> Result<()> {
    let estate = client.get_estate(id).await?;

    if json {
        let output = highlight(
            &serde_json::to_string_pretty(&estate)?,
            Options {
                formatter: FormatterOption::Terminal {
                    theme: Some(
                        themes::get("ayu_light").expect("Syntax highlighting theme not found"),
                    ),
                },
                lang_or_file: Some("json"),
            },
        );
        println!("{}", output);
    } else {
        element!(EstateDetail(estate: Some(estate))).print();
    }
    Ok(())
}

async fn list_categories(client: &AmlakClient) -> Result<()> {
    let categories = client.list_categories().await?;
    element!(CategoryList(categories: categories)).print();
    Ok(())
}

async fn reminders(client: &AmlakClient, command: ReminderCommands) -> Result<()> {
    match command {
        ReminderCommands::List => {
            let reminders = client.list_reminders().await?;
            element!(ReminderList(reminders: reminders)).print();
        }
        ReminderCommands::Add { title, offset } => {
            let due_at = Timestamp(SystemTime::now() + *offset);
            let reminder = client
                .create_reminder(&CreateReminderRequest { title, due_at })
                .await?;
            element!(SuccessMessage(message: format!("Reminder '{}' added", reminder.title)))
                .print();
        }
    }
    Ok(())
}

async fn list_requests(client: &AmlakClient) -> Result<()> {
    let requests = client.list_estate_requests().await?;
    element!(RequestList(requests: requests)).print();
    Ok(())
}

async fn upload_asset(client: &AmlakClient, file: PathBuf, kind: AssetKind) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut stream = client.upload_asset(&file, Some(kind), cancel.clone())?;

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let (tx, rx) = watch::channel(0.0f32);

    let process_stream = async {
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            match event? {
                UploadEvent::Progress(progress) => {
                    let _ = tx.send(progress.percent as f32);
                }
                UploadEvent::Complete(asset) => {
                    outcome = Some(Some(asset));
                    break;
                }
                UploadEvent::Cancelled => {
                    outcome = Some(None);
                    break;
                }
            }
        }
        Ok::<_, anyhow::Error>(outcome.expect("Stream ended without a terminal event"))
    };

    let mut progress_bar =
        element!(ProgressBar(title: "Uploading".to_string(), progress: Some(rx)));

    let result = tokio::select! {
        result = process_stream => result,
        _ = progress_bar.render_loop() => {
            unreachable!("render_loop should not terminate")
        }
    };

    match result {
        Ok(Some(asset)) => {
            element!(SuccessMessage(
                message: format!("Uploaded {} to {}", asset.file_name, asset.url)
            ))
            .print();
        }
        // User-initiated cancellation is silent.
        Ok(None) => {}
        Err(_) => {
            element!(ErrorMessage(
                message: "Something went wrong, the file was not uploaded".to_string()
            ))
            .print();
        }
    }
    Ok(())
}

fn print_commission(command: CommissionCommands) {
    match command {
        CommissionCommands::Sale { price, rate } => {
            let result = commission::sale_commission(price, rate);
            let vat_label = if rate.is_some() {
                // With a negotiated rate the VAT figure is informational
                // only and not part of the total.
                "VAT 10% (not charged)"
            } else {
                "VAT 10%"
            };
            let rows = vec![
                ("Transaction amount".to_string(), format_toman(price)),
                ("Commission".to_string(), format_toman(result.base)),
                (vat_label.to_string(), format_toman(result.tax)),
                ("Total".to_string(), format_toman(result.total)),
                ("Buyer share".to_string(), format_toman(result.buyer_share)),
                ("Seller share".to_string(), format_toman(result.seller_share)),
            ];
            element!(CommissionBreakdown(title: "Sale commission".to_string(), rows: rows))
                .print();
        }
        CommissionCommands::Rent {
            deposit,
            monthly_rent,
        } => {
            let result = commission::rent_commission(deposit, monthly_rent);
            let rows = vec![
                ("Rahn (deposit)".to_string(), format_toman(deposit)),
                ("Ejareh (monthly rent)".to_string(), format_toman(monthly_rent)),
                ("Commission".to_string(), format_toman(result.base)),
                ("VAT 10%".to_string(), format_toman(result.tax)),
                ("Total".to_string(), format_toman(result.total)),
                ("Owner share".to_string(), format_toman(result.owner_share)),
                ("Tenant share".to_string(), format_toman(result.tenant_share)),
            ];
            element!(CommissionBreakdown(title: "Rent commission".to_string(), rows: rows))
                .print();
        }
    }
}

fn category_completer(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let mut completions = vec![];
    let Some(current) = current.to_str() else {
        return completions;
    };

    let Ok(config) = config::read_config() else {
        return completions;
    };

    let client = AmlakClient::new(config.amlak_base_url, TokenStore::new(config.session));

    let handle = Handle::current();
    let Ok(categories) = handle.block_on(client.list_categories()) else {
        return completions;
    };

    categories.into_iter().for_each(|category| {
        if category.slug.starts_with(current) {
            completions.push(CompletionCandidate::new(category.slug));
        }
    });

    completions
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        if let Some(def) = default {
            Ok(def.to_string())
        } else {
            Ok(input)
        }
    } else {
        Ok(input)
    }
}

fn interactive_config() -> Result<()> {
    element!(ConfigHeader()).print();

    let amlak_base_url = loop {
        let base_url_str = read_input(
            "Amlak Base URL",
            Some(DEFAULT_AMLAK_BASE_URL),
            Some("The base URL for the marketplace backend"),
        )?;

        match Url::parse(&base_url_str) {
            Ok(url) => break url,
            Err(e) => {
                element!(ErrorMessage(message: format!("Invalid URL: {}", e))).print();
                println!();
            }
        }
    };

    let default_city_str = read_input(
        "Default City",
        None,
        Some("Optional: set a default city for listing searches"),
    )?;
    let default_city = if default_city_str.is_empty() {
        None
    } else {
        Some(default_city_str)
    };

    let config_file = config::ConfigFile {
        amlak_base_url: Some(amlak_base_url),
        default_city,
    };

    config::write_config(config_file)?;

    element!(SuccessMessage(message: "Configuration complete! Run `amlak login` to sign in.".to_string()))
        .print();

    Ok(())
}
