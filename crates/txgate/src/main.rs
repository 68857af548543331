//! txgate reference host: wires the confirmation engine to the concrete
//! adapters and drives one dapp transaction request end-to-end.

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use clap::{Parser, ValueEnum};
use eyre::WrapErr;
use semver::Version;
use tokio::sync::watch;
use tracing::{info, warn};

use txgate_flow_adapters::{
    crypto, FlowAdapterConfig, HardwareDeviceAdapter, PayloadRiskAdapter, SettlementServiceAdapter,
    SystemClockAdapter, VaultPasswordAdapter,
};
use txgate_flow_core::{
    AuthError, ConfirmationEngine, ConfirmationRequest, DappIdentity, FlowHandle, NewRequest,
    SignedTx, TransactionDraft, TransferState, ValidationLimits,
};

mod host;

#[derive(Parser, Debug)]
#[command(
    name = "txgate",
    version,
    about = "Drives one dapp transaction confirmation end-to-end against the reference adapters."
)]
struct Cli {
    /// Authorization path to exercise.
    #[arg(long, value_enum, default_value = "password")]
    path: AuthPath,

    /// JSON fixture with the incoming request; a built-in demo request is
    /// used when omitted.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Settlement service base URL. Requests settle in memory when omitted.
    #[arg(long)]
    settlement_url: Option<String>,

    /// Exit animation length for the render-key driver, in milliseconds.
    #[arg(long, default_value_t = 200)]
    animation_ms: u64,

    /// Vault password; prompted for when omitted.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthPath {
    Password,
    Hardware,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!(
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIME"),
        "starting txgate"
    );

    let mut config = FlowAdapterConfig::from_env();
    if let Some(url) = &cli.settlement_url {
        config.settlement_base_url = url.clone();
    }

    let settlement = match cli.settlement_url {
        Some(_) => SettlementServiceAdapter::http(&config)?,
        None => SettlementServiceAdapter::in_memory(),
    };
    let hardware = HardwareDeviceAdapter::new(&config);
    let risk = PayloadRiskAdapter::new(config.danger_value_threshold_wei);

    let vault_password = match cli.path {
        AuthPath::Password => obtain_password(cli.password.clone(), "Vault password: ").await?,
        // The vault is still wired up, just never consulted.
        AuthPath::Hardware => String::new(),
    };
    let password =
        VaultPasswordAdapter::provision(&vault_password, b"txgate-demo-signing-secret", &config)
            .wrap_err("failed to provision the demo vault")?;

    let (engine, handle, snapshots) = ConfirmationEngine::new(
        risk,
        password,
        hardware.clone(),
        settlement.clone(),
        SystemClockAdapter,
        ValidationLimits::default(),
    );
    tokio::spawn(engine.run());
    tokio::spawn(host::drive_sequencer(
        snapshots.clone(),
        Duration::from_millis(cli.animation_ms),
    ));

    let request = load_request(cli.request.as_deref())?;
    let drafts = request.transactions.clone();
    handle
        .start(request)
        .wrap_err("request rejected before entering the flow")?;

    let mut snapshots = snapshots;
    wait_state(&mut snapshots, TransferState::Initial).await?;

    match cli.path {
        AuthPath::Password => {
            run_password_path(&handle, &mut snapshots, vault_password).await?;
        }
        AuthPath::Hardware => {
            run_hardware_path(&handle, &mut snapshots, &hardware, &drafts).await?;
        }
    }

    let resolved = snapshots
        .wait_for(|s| s.id.0 != 0 && s.state() == TransferState::None)
        .await
        .wrap_err("engine stopped before the request resolved")?
        .clone();
    info!(request = resolved.id.0, "request resolved");
    for record in settlement.records() {
        info!(origin = %record.origin_id, outcome = ?record.outcome, "settled");
    }
    Ok(())
}

async fn run_password_path(
    handle: &FlowHandle,
    snapshots: &mut watch::Receiver<ConfirmationRequest>,
    first_password: String,
) -> eyre::Result<()> {
    handle.choose_software_path();
    wait_state(snapshots, TransferState::Password).await?;

    let mut password = first_password;
    loop {
        handle.submit_password(password);
        let settled = snapshots
            .wait_for(|s| {
                (s.id.0 != 0 && s.state() == TransferState::None)
                    || s.stage.auth_error().is_some()
            })
            .await
            .wrap_err("engine stopped mid-authorization")?
            .clone();
        let Some(error) = settled.stage.auth_error() else {
            return Ok(());
        };
        match error {
            AuthError::InvalidPassword => {
                warn!("wrong password, try again");
                handle.clear_error();
                password = obtain_password(None, "Vault password: ").await?;
            }
            error => {
                handle.cancel();
                return Err(eyre::eyre!("password authorization failed: {error}"));
            }
        }
    }
}

async fn run_hardware_path(
    handle: &FlowHandle,
    snapshots: &mut watch::Receiver<ConfirmationRequest>,
    hardware: &HardwareDeviceAdapter,
    drafts: &[TransactionDraft],
) -> eyre::Result<()> {
    // Demo device: recent signing app, approves on the first attempt.
    hardware.set_app_version(Version::new(2, 1, 0));
    hardware.push_sign_outcome(Ok(SignedTx {
        tx_hash: crypto::bundle_digest(drafts),
        raw: Bytes::from_static(b"txgate-demo-device-envelope"),
    }));

    handle.choose_hardware_path();
    let routed = snapshots
        .wait_for(|s| {
            matches!(
                s.state(),
                TransferState::WarningHardware | TransferState::ConnectHardware
            )
        })
        .await
        .wrap_err("engine stopped mid-authorization")?
        .clone();
    if routed.state() == TransferState::WarningHardware {
        warn!("bundle flagged dangerous, acknowledging the warning");
        handle.acknowledge_hardware_warning();
        wait_state(snapshots, TransferState::ConnectHardware).await?;
    }

    hardware.begin_connect();
    Ok(())
}

async fn wait_state(
    snapshots: &mut watch::Receiver<ConfirmationRequest>,
    want: TransferState,
) -> eyre::Result<()> {
    snapshots
        .wait_for(|s| s.state() == want)
        .await
        .wrap_err_with(|| format!("engine stopped before reaching {want:?}"))?;
    Ok(())
}

async fn obtain_password(arg: Option<String>, prompt: &'static str) -> eyre::Result<String> {
    if let Some(password) = arg {
        return Ok(password);
    }
    tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
        .await
        .wrap_err("password prompt task failed")?
        .wrap_err("failed to read password")
}

fn load_request(path: Option<&std::path::Path>) -> eyre::Result<NewRequest> {
    let Some(path) = path else {
        return Ok(demo_request());
    };
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read request fixture {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("invalid request fixture {}", path.display()))
}

fn demo_request() -> NewRequest {
    NewRequest {
        origin_id: "demo-request-1".to_owned(),
        dapp: Some(DappIdentity {
            name: "Demo Dapp".to_owned(),
            url: "https://dapp.example".to_owned(),
            icon_url: None,
        }),
        transactions: vec![
            TransactionDraft {
                to: Address::repeat_byte(0x61),
                value: U256::from(250_000_000_000_000u64),
                data: Bytes::new(),
            },
            TransactionDraft {
                to: Address::repeat_byte(0x62),
                value: U256::from(125_000_000_000_000u64),
                data: Bytes::new(),
            },
        ],
    }
}
