use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use nawala_checker::CommandChecker;
use nawala_core::{
    commands::CommandChannel,
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    monitor::DomainMonitor,
    notifier::Notifier,
    remediation::Remediator,
    store::{FileStore, StateStore},
};
use nawala_kutt::KuttClient;
use nawala_telegram::{build_bot, TelegramFeed, TelegramMessenger};

#[tokio::main]
async fn main() -> Result<(), nawala_core::Error> {
    nawala_core::logging::init("nawala")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        domain_list = %cfg.domain_list_file.display(),
        checker = %cfg.checker_program.display(),
        "nawala guard starting"
    );

    let store: Arc<dyn StateStore> = Arc::new(FileStore::from_config(&cfg));
    let destination = store.load_destination();
    match destination {
        Some(chat) => info!(chat_id = chat.0, "loaded notification destination"),
        None => info!("no destination yet; send /installnawalabot in the target chat"),
    }

    let bot = build_bot(&cfg.telegram_bot_token, cfg.telegram_long_poll)?;
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let notifier = Arc::new(Notifier::new(messenger, destination));

    let shortlinks = Arc::new(KuttClient::from_config(&cfg)?);
    let checker = Arc::new(CommandChecker::from_config(&cfg));

    let remediator = Remediator::new(cfg.clone(), store.clone(), shortlinks, notifier.clone());
    let monitor = DomainMonitor::new(
        cfg.clone(),
        store.clone(),
        checker,
        remediator,
        notifier.clone(),
    );
    let commands = CommandChannel::new(
        cfg.clone(),
        Arc::new(TelegramFeed::new(bot, cfg.telegram_long_poll)),
        store,
        notifier,
    );

    let cancel = CancellationToken::new();
    let mut monitor_task = tokio::spawn(monitor.run(cancel.clone()));
    let mut command_task = tokio::spawn(commands.run(cancel.clone()));

    // Either loop ending on its own is fatal; an external restart is the recovery path.
    let outcome = tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        info!("shutdown requested");
        Ok(())
      }
      res = &mut monitor_task => task_exit("domain monitor", res),
      res = &mut command_task => task_exit("command channel", res),
    };

    cancel.cancel();
    for task in [monitor_task, command_task] {
        if !task.is_finished() {
            let _ = task.await;
        }
    }

    outcome
}

fn task_exit(
    name: &str,
    res: Result<nawala_core::Result<()>, tokio::task::JoinError>,
) -> Result<(), nawala_core::Error> {
    let err = match res {
        Ok(Ok(())) => nawala_core::Error::External(format!("{name} exited unexpectedly")),
        Ok(Err(e)) => e,
        Err(join) => nawala_core::Error::External(format!("{name} panicked: {join}")),
    };
    error!("{name} stopped: {err}");
    Err(err)
}
