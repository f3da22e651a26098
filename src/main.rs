use std::sync::Arc;
use std::time::Duration;

use clap::{arg, command, value_parser, ArgMatches};

use dispenser::auth::{ConsolePasscode, LocalAuthGate, NoBiometrics};
use dispenser::console::Console;
use dispenser::display::{self, TerminalObserver};
use dispenser::link::{
    bt_scan, get_link_simulator, ConnectionManager, LinkBT, LinkConfig, LinkDriver, LinkError,
    LinkHandle, DEFAULT_DEVICE_NAME, DEFAULT_GREETING,
};
use dispenser::operations::{monitor, OrderDispatcher, OrderObserver};
use dispenser::protocol::ResourceType;
use dispenser::{info, warning};

fn link_config(cmd: &ArgMatches) -> LinkConfig {
    let mut config = LinkConfig::default();
    if let Some(name) = cmd.get_one::<String>("device-name") {
        config.device_name = name.clone();
    }
    if let Some(delay) = cmd.get_one::<u64>("startup-delay") {
        config.startup_delay = Duration::from_millis(*delay);
    }
    if let Some(greeting) = cmd.get_one::<String>("greeting") {
        config.greeting = greeting.clone();
    }
    config
}

async fn open_link(cmd: &ArgMatches) -> Result<LinkHandle, LinkError> {
    let driver: Box<dyn LinkDriver> = if cmd.get_flag("simulate") {
        Box::new(get_link_simulator().await?)
    } else {
        Box::new(LinkBT::new().await?)
    };
    Ok(ConnectionManager::spawn(driver, link_config(cmd)))
}

fn dispatcher(cmd: &ArgMatches, link: &LinkHandle, console: Console) -> OrderDispatcher {
    let passcode = cmd.get_one::<String>("passcode").cloned();
    let auth = LocalAuthGate::new(
        Box::new(NoBiometrics),
        Box::new(ConsolePasscode::new(console, passcode)),
    );
    OrderDispatcher::new(
        Box::new(auth),
        Box::new(link.clone()),
        Arc::new(TerminalObserver),
    )
}

async fn order(cmd: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let link = open_link(cmd).await?;
    let dispatcher = dispatcher(cmd, &link, Console::stdin());
    let mut quantity = cmd.get_one::<String>("quantity").cloned().unwrap_or_default();
    let selection = cmd.get_one::<i64>("resource").copied().unwrap_or_default();
    // Bad input is reported straight away, not after the dispenser shows up
    if dispatcher.validate(&quantity, selection).is_err() {
        return Ok(());
    }

    let observing = dispatcher.observe(&link);
    let id = link.wait_for_connection().await?;
    info!("Connected to {}", id);

    if dispatcher.submit(&mut quantity, selection).await.is_err() {
        // Already reported through the observer or the log
        return Ok(());
    }

    match cmd.get_one::<u64>("wait") {
        Some(secs) => tokio::time::sleep(Duration::from_secs(*secs)).await,
        None => observing.await??,
    }
    Ok(())
}

async fn interactive(cmd: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let link = open_link(cmd).await?;
    let console = Console::stdin();
    let dispatcher = dispatcher(cmd, &link, console.clone());
    let _observing = dispatcher.observe(&link);

    info!("Enter orders as <grams> <resource>, one per line:");
    for resource in ResourceType::all() {
        info!("  {}  {}", resource.code(), resource.name());
    }

    while let Some(line) = console.read_line("order> ").await {
        let mut parts = line.split_whitespace();
        let mut quantity = parts.next().unwrap_or_default().to_owned();
        let selection = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or_default();
        if let Ok(frame) = dispatcher.submit(&mut quantity, selection).await {
            dispenser::trace_packet!("Sent {:?}", frame);
        }
    }

    info!("Input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let link_args = [
        arg!(--"device-name" <name>)
            .help("Only connect to a peripheral advertising exactly this name")
            .default_value(DEFAULT_DEVICE_NAME),
        arg!(--"startup-delay" <ms>)
            .help("Milliseconds to wait before the first scan")
            .value_parser(value_parser!(u64))
            .default_value("2000"),
        arg!(--greeting <text>)
            .help("Sent to the peripheral once its serial channel is ready")
            .default_value(DEFAULT_GREETING),
        arg!(--simulate).help("Use a simulated dispenser instead of Bluetooth"),
    ];
    let passcode = arg!(--passcode <passcode>)
        .help("Operator passcode required to place orders")
        .env("DISPENSER_PASSCODE")
        .hide_env_values(true);

    let matches = command!()
        .arg(arg!(--trace).help("Trace packets and state changes").global(true))
        .subcommand(
            command!("order")
                .about("Order a quantity of a resource")
                .arg(
                    arg!(--quantity <grams>)
                        .help("Grams to dispense, 1 to 150")
                        .required(true),
                )
                .arg(
                    arg!(--resource <index>)
                        .help("Resource index, see `list`")
                        .value_parser(value_parser!(i64))
                        .default_value("0"),
                )
                .arg(
                    arg!(--wait <secs>)
                        .help("Stop showing readings after this many seconds")
                        .value_parser(value_parser!(u64)),
                )
                .args(link_args.clone())
                .arg(passcode.clone()),
        )
        .subcommand(
            command!("interactive")
                .about("Read orders from stdin, one per line")
                .args(link_args.clone())
                .arg(passcode.clone()),
        )
        .subcommand(
            command!("monitor")
                .about("Show weight readings from the dispenser")
                .args(link_args.clone()),
        )
        .subcommand(command!("list").about("List all resources"))
        .subcommand(command!("scan").about("Scan for nearby Bluetooth devices"))
        .get_matches();

    display::initialize_display();
    if matches.get_flag("trace") {
        dispenser::logging::enable_tracing();
    }

    match matches.subcommand() {
        Some(("order", cmd)) => order(cmd).await?,
        Some(("interactive", cmd)) => interactive(cmd).await?,
        Some(("monitor", cmd)) => {
            let link = open_link(cmd).await?;
            let observer: Arc<dyn OrderObserver> = Arc::new(TerminalObserver);
            monitor(link.clone(), observer).await?;
        }
        Some(("list", _cmd)) => {
            for resource in ResourceType::all() {
                println!("{}  {}", resource.code(), resource.name());
            }
        }
        Some(("scan", _cmd)) => {
            let found = bt_scan(Duration::from_secs(5)).await?;
            if found.is_empty() {
                warning!("No devices found");
            }
            for (name, id) in found {
                println!("{}  {}", name, id);
            }
        }
        _ => {}
    }

    Ok(())
}
