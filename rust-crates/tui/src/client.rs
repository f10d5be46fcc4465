use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    ChainRegistry,
    network_config,
};
use lottery_client::{
    contract::{
        AlloyGateway,
        LotteryGateway,
    },
    notifications::NotificationKind,
    participation::{
        ParticipationViewModel,
        Trigger,
        ViewState,
    },
    session::{
        SessionProvider,
        SessionState,
    },
    wallets,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::{
        Duration,
        Instant,
    },
};
use tokio::time;
use tracing::{
    info,
    warn,
};

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { names: Vec<String>, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub rpc_url: String,
    pub wallets: WalletConfig,
    pub registry_path: PathBuf,
    pub abi_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub rpc_url: String,
    pub session: SessionState,
    pub network_name: Option<&'static str>,
    pub account_index: usize,
    pub account_count: usize,
    pub view: ViewState,
    pub can_participate: bool,
    pub notifications: Vec<(NotificationKind, String)>,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController<G> {
    view_model: ParticipationViewModel<G>,
    session: SessionProvider,
    rpc_url: String,
}

impl AppController<AlloyGateway> {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let registry = ChainRegistry::load(&config.registry_path)
            .map_err(|e| eyre!(e))
            .wrap_err("Failed to load contract address registry")?;
        if registry.is_empty() {
            warn!(
                path = %config.registry_path.display(),
                "no contract addresses registered; every chain will be unsupported"
            );
        }
        check_abi(&config.abi_path)?;

        let WalletConfig::Keystore { names, dir } = &config.wallets;
        let mut signers = Vec::with_capacity(names.len());
        for name in names {
            let descriptor = wallets::find_wallet(dir, name)?;
            let signer = wallets::unlock_wallet(&descriptor)?;
            info!(wallet = %name, address = %signer.address(), "unlocked wallet");
            signers.push(signer);
        }
        let accounts = signers.iter().map(|signer| signer.address()).collect();

        let gateway = AlloyGateway::connect(&config.rpc_url, signers)?;
        Ok(Self::from_parts(
            ParticipationViewModel::new(gateway, registry),
            SessionProvider::new(accounts),
            config.rpc_url,
        ))
    }
}

impl<G: LotteryGateway> AppController<G> {
    fn from_parts(
        view_model: ParticipationViewModel<G>,
        session: SessionProvider,
        rpc_url: String,
    ) -> Self {
        Self {
            view_model,
            session,
            rpc_url,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.view_model.set_status(message);
    }

    async fn poll_session(&mut self) {
        if let Some(event) = self.session.poll(self.view_model.gateway()).await {
            self.view_model.handle_session_event(event).await;
        }
    }

    async fn next_account(&mut self) {
        match self.session.next_account() {
            Some(event) => self.view_model.handle_session_event(event).await,
            None => self.set_status("Only one wallet unlocked; pass --wallet again to add more"),
        }
    }

    async fn refresh(&mut self) {
        self.view_model.remount(Trigger::Manual).await;
    }

    fn build_snapshot(&mut self) -> AppSnapshot {
        self.view_model.notifications_mut().prune(Instant::now());
        let session = *self.view_model.session();
        let account_index = session
            .account
            .and_then(|a| self.session.accounts().iter().position(|x| *x == a))
            .unwrap_or(0);
        AppSnapshot {
            rpc_url: self.rpc_url.clone(),
            session,
            network_name: session
                .chain_id
                .and_then(network_config)
                .map(|network| network.name),
            account_index,
            account_count: self.session.accounts().len(),
            view: self.view_model.state().clone(),
            can_participate: self.view_model.can_participate(),
            notifications: self
                .view_model
                .notifications()
                .active()
                .map(|n| (n.kind, n.message.clone()))
                .collect(),
            status: self.view_model.status().to_string(),
            errors: self.view_model.errors().to_vec(),
        }
    }

    fn participation_unavailable_reason(&self) -> &'static str {
        match self.view_model.state() {
            ViewState::Ready { busy: Some(_), .. } => "a transaction is still pending",
            ViewState::Ready { snapshot, .. } if snapshot.has_current_account_participated => {
                "this account already participates in the current round"
            }
            ViewState::Ready { .. } => "the participation fee could not be read",
            ViewState::Resolving { .. } => "the lottery is still loading",
            ViewState::Unsupported { .. } => "no lottery is deployed on this network",
            ViewState::Disconnected => "no wallet is connected",
        }
    }
}

/// A missing ABI file only means nothing was deployed yet; a present but
/// incomplete one points at a different contract.
fn check_abi(path: &Path) -> Result<()> {
    let abi = deployments::read_abi(path)
        .map_err(|e| eyre!(e))
        .wrap_err("Failed to read contract ABI")?;
    let Some(abi) = abi else {
        warn!(path = %path.display(), "contract ABI file not found, skipping check");
        return Ok(());
    };
    let abi = lottery_abi::parse_abi(abi)
        .wrap_err_with(|| format!("{} is not a JSON ABI", path.display()))?;
    let missing = lottery_abi::missing_entries(&abi);
    if !missing.is_empty() {
        return Err(eyre!(
            "Contract ABI at {} is incompatible; missing {}",
            path.display(),
            missing.join(", ")
        ));
    }
    Ok(())
}

pub fn init_tracing(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "lottery-tui.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = AppController::new(config).await?;
    let mut ui_state = ui::UiState::default();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let mut input_events = ui::input_event_stream();
    tracing::info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn show_processing_status<G: LotteryGateway>(
    controller: &mut AppController<G>,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
    context: &'static str,
) -> Result<()> {
    controller.set_status(message);
    let snapshot = controller.build_snapshot();
    ui::draw(ui_state, &snapshot).wrap_err(context)
}

async fn participate<G: LotteryGateway>(
    controller: &mut AppController<G>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    if !controller.view_model.can_participate() {
        let reason = controller.participation_unavailable_reason();
        controller.set_status(format!("Cannot participate: {reason}"));
        return Ok(());
    }
    show_processing_status(
        controller,
        ui_state,
        "Submitting participation...",
        "draw while submitting participation failed",
    )?;
    // failures are already recorded in the error panel
    let Ok(pending) = controller.view_model.submit_participation().await else {
        return Ok(());
    };
    let snapshot = controller.build_snapshot();
    ui::draw(ui_state, &snapshot).wrap_err("draw while awaiting confirmation failed")?;
    let _ = controller.view_model.confirm_participation(pending).await;
    Ok(())
}

async fn run_loop<G: LotteryGateway>(
    mut controller: AppController<G>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    controller.poll_session().await;
    let snapshot = controller.build_snapshot();
    ui::draw(ui_state, &snapshot).wrap_err("initial draw failed")?;

    let mut session_poll = time::interval(SESSION_POLL_INTERVAL);
    let mut redraw = time::interval(REDRAW_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::NextAccount => controller.next_account().await,
                    ui::UserEvent::Refresh => controller.refresh().await,
                    ui::UserEvent::Participate => {
                        participate(&mut controller, ui_state).await?;
                    }
                }
            }
            _ = session_poll.tick() => controller.poll_session().await,
            winner = controller.view_model.next_winner() => match winner {
                Some(Ok(announcement)) => {
                    controller.view_model.handle_winner_event(announcement).await;
                }
                Some(Err(e)) => {
                    controller
                        .view_model
                        .push_errors(vec![format!("Winner listener error: {e}")]);
                }
                None => {
                    let message = "Winner listener closed; press r to resubscribe".to_string();
                    controller.view_model.push_errors(vec![message]);
                }
            },
            _ = redraw.tick() => {}
        }
        let snapshot = controller.build_snapshot();
        ui::draw(ui_state, &snapshot).wrap_err("draw failed")?;
    }
    Ok(())
}
