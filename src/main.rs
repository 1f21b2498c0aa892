use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subscription_checkout::application::checkout::CheckoutOrchestrator;
use subscription_checkout::application::coupon_validator::CouponValidator;
use subscription_checkout::application::session::PaymentSessionStateMachine;
use subscription_checkout::application::tracker::{SessionTracker, TrackingOutcome};
use subscription_checkout::config::{CheckoutConfig, TrackerConfig};
use subscription_checkout::domain::clock::{ClockRef, SystemClock};
use subscription_checkout::domain::money::Money;
use subscription_checkout::domain::payment::{PaymentMethod, PaymentStatus};
use subscription_checkout::domain::ports::{CouponStoreRef, PaymentSessionStoreRef};
use subscription_checkout::infrastructure::in_memory::{InMemoryCouponStore, InMemoryPaymentSessionStore};
use subscription_checkout::infrastructure::simulated_processor::{SimulatedBehavior, SimulatedProcessor};
use subscription_checkout::interfaces::api::{
    CheckoutApi, CheckoutRequestDto, CheckoutResponse, CouponValidationRequest, PaymentStatusResponse,
};
use subscription_checkout::interfaces::csv::coupon_reader::CouponReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Coupon seed file (CSV) loaded before running the command
    #[arg(long, global = true, env = "CHECKOUT_COUPONS")]
    coupons: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "CHECKOUT_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Settings {
    /// Subscription plan price; checkouts for other amounts are refused
    #[arg(long, global = true, env = "CHECKOUT_PLAN_AMOUNT", default_value = "154.80")]
    plan_amount: Decimal,

    /// Share of the price taken off for PIX payments
    #[arg(long, global = true, env = "CHECKOUT_PIX_DISCOUNT_RATE", default_value = "0.15")]
    pix_discount_rate: Decimal,

    /// Minutes a PIX charge stays payable
    #[arg(long, global = true, env = "CHECKOUT_PIX_WINDOW_MINUTES", default_value_t = 60)]
    pix_window_minutes: u64,

    /// Installment cap for credit-card payments, 1 to 12
    #[arg(long, global = true, env = "CHECKOUT_MAX_INSTALLMENTS", default_value_t = 12)]
    max_installments: u32,

    /// Countdown granularity of a tracked PIX session
    #[arg(long, global = true, env = "CHECKOUT_TICK_INTERVAL_MS", default_value_t = 1_000)]
    tick_interval_ms: u64,

    /// Settlement polling cadence of a tracked PIX session
    #[arg(long, global = true, env = "CHECKOUT_POLL_INTERVAL_MS", default_value_t = 5_000)]
    poll_interval_ms: u64,
}

impl Settings {
    fn config(&self) -> Result<CheckoutConfig> {
        let config = CheckoutConfig {
            plan_amount: Some(Money::new(self.plan_amount).into_diagnostic()?),
            pix_discount_rate: self.pix_discount_rate,
            pix_window: Duration::from_secs(self.pix_window_minutes * 60),
            max_installments: self.max_installments,
            tracker: TrackerConfig {
                tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            },
        };
        config.validate().into_diagnostic()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
enum MethodArg {
    Pix,
    CreditCard,
}

impl From<MethodArg> for PaymentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Pix => Self::Pix,
            MethodArg::CreditCard => Self::CreditCard,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
enum OutcomeArg {
    Approved,
    Rejected,
}

impl From<OutcomeArg> for PaymentStatus {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Approved => Self::Approved,
            OutcomeArg::Rejected => Self::Rejected,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Price a checkout without creating it
    Quote {
        #[arg(long, value_enum, ignore_case = true)]
        method: MethodArg,
        /// Base amount; defaults to the plan price
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long, default_value_t = 1)]
        installments: u32,
        #[arg(long)]
        coupon: Option<String>,
    },
    /// Check a coupon code against an amount
    ValidateCoupon {
        code: String,
        /// Amount to apply the coupon to; defaults to the plan price
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Create a checkout from a JSON request and follow it to a final status
    Checkout {
        /// Checkout request JSON file
        request: PathBuf,
        /// Simulated processor settles PIX charges after this many polls
        #[arg(long, default_value_t = 1)]
        settle_after_polls: u32,
        /// Outcome the simulated processor reports
        #[arg(long, value_enum, ignore_case = true, default_value = "APPROVED")]
        outcome: OutcomeArg,
    },
}

struct Stores {
    coupons: CouponStoreRef,
    sessions: PaymentSessionStoreRef,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = subscription_checkout::infrastructure::rocksdb::RocksDBStore::open(db_path)
            .into_diagnostic()?;
        return Ok(Stores {
            coupons: Arc::new(store.clone()),
            sessions: Arc::new(store),
        });
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if let Some(db_path) = db_path {
        tracing::warn!(
            path = %db_path.display(),
            "WARNING: built without storage-rocksdb, --db-path ignored; using in-memory storage"
        );
    }

    Ok(Stores {
        coupons: Arc::new(InMemoryCouponStore::new()),
        sessions: Arc::new(InMemoryPaymentSessionStore::new()),
    })
}

async fn seed_coupons(path: PathBuf, coupons: &CouponStoreRef, clock: &ClockRef) -> Result<()> {
    let file = File::open(&path).into_diagnostic()?;
    let mut loaded = 0;
    for coupon in CouponReader::new(file, clock.now()).coupons() {
        match coupon {
            Ok(coupon) => {
                coupons.store(coupon).await.into_diagnostic()?;
                loaded += 1;
            }
            Err(e) => tracing::warn!(error = %e, "skipping coupon row"),
        }
    }
    tracing::info!(path = %path.display(), loaded, "coupons seeded");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.settings.config()?;
    let plan_amount = cli.settings.plan_amount;
    let clock: ClockRef = Arc::new(SystemClock);

    let stores = open_stores(cli.db_path)?;
    if let Some(path) = cli.coupons {
        seed_coupons(path, &stores.coupons, &clock).await?;
    }

    let behavior = match &cli.command {
        Command::Checkout {
            settle_after_polls,
            outcome,
            ..
        } => SimulatedBehavior {
            settle_after_polls: Some(*settle_after_polls),
            settle_with: (*outcome).into(),
            ..SimulatedBehavior::default()
        },
        _ => SimulatedBehavior::default(),
    };
    let processor = SimulatedProcessor::new(behavior);

    let machine = Arc::new(PaymentSessionStateMachine::new(
        stores.sessions.clone(),
        stores.coupons.clone(),
        clock.clone(),
    ));
    let validator = CouponValidator::new(stores.coupons.clone());
    let tracker_config = config.tracker;
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        config,
        validator.clone(),
        Arc::new(processor.clone()),
        machine.clone(),
    ));

    match cli.command {
        Command::Quote {
            method,
            amount,
            installments,
            coupon,
        } => {
            let amount = Money::new(amount.unwrap_or(plan_amount)).into_diagnostic()?;
            let (pricing, _applied) = orchestrator
                .quote(amount, method.into(), installments, coupon.as_deref())
                .await
                .into_diagnostic()?;
            print_json(&pricing)?;
        }
        Command::ValidateCoupon { code, amount } => {
            let api = CheckoutApi::new(orchestrator, validator, machine);
            let response = api
                .validate_coupon(CouponValidationRequest {
                    code,
                    amount: amount.unwrap_or(plan_amount),
                })
                .await;
            match response {
                Ok(response) => print_json(&response)?,
                Err(error) => {
                    print_json(&error)?;
                    std::process::exit(1);
                }
            }
        }
        Command::Checkout {
            request, outcome, ..
        } => {
            let file = File::open(request).into_diagnostic()?;
            let request: CheckoutRequestDto = serde_json::from_reader(file).into_diagnostic()?;
            let api = CheckoutApi::new(orchestrator, validator, machine.clone());

            let created: CheckoutResponse = match api.create_checkout(request).await {
                Ok(created) => created,
                Err(error) => {
                    print_json(&error)?;
                    std::process::exit(1);
                }
            };
            print_json(&created)?;

            let tracker = SessionTracker::new(machine.clone(), Arc::new(processor), tracker_config);
            let handle = tracker.track(created.id).await.into_diagnostic()?;

            // Card outcomes arrive as a processor callback rather than through polling.
            if created.payment_method == PaymentMethod::CreditCard && !created.status.is_terminal() {
                let callback = machine.clone();
                let id = created.id;
                tokio::spawn(async move {
                    if let Err(e) = callback.notify(id, outcome.into()).await {
                        tracing::warn!(session = %id, error = %e, "simulated card callback refused");
                    }
                });
            }

            let session = match handle.finished().await.into_diagnostic()? {
                TrackingOutcome::Settled(session) => session,
                TrackingOutcome::Detached => machine.get(created.id).await.into_diagnostic()?,
            };
            print_json(&PaymentStatusResponse::new(&session, clock.now()))?;
        }
    }

    Ok(())
}
