use cellular_device::loopback::{LoopbackFactory, LoopbackScript, Reply};
use cellular_device::psm;
use cellular_device::{CellularDevice, DeviceConfig, DeviceError, SimState};
use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("cellular-probe")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("📶 Drive the cellular device coordinator against a scripted loopback modem")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON device configuration")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("link")
                .short("l")
                .long("link")
                .value_name("LINK")
                .help("Default link name")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .value_name("MS")
                .help("AT command timeout in milliseconds")
                .takes_value(true)
                .global(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Timeout must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("sim")
                .long("sim")
                .value_name("STATE")
                .help("SIM state reported by the loopback modem")
                .takes_value(true)
                .possible_values(&["ready", "pin", "puk", "absent"])
                .default_value("ready")
                .global(true),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Log AT traffic")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .arg(
            Arg::with_name("transcript")
                .long("transcript")
                .help("Print every AT command sent")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("probe")
                .about("🏓 Check modem readiness and SIM state"),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("📇 Read device identification"),
        )
        .subcommand(
            SubCommand::with_name("pin")
                .about("🔑 Unlock the SIM")
                .arg(
                    Arg::with_name("pin")
                        .help("SIM PIN")
                        .required(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("psm")
                .about("🔋 Configure power saving mode")
                .arg(
                    Arg::with_name("periodic")
                        .help("Requested periodic TAU time in seconds (0 with active 0 disables)")
                        .required(true)
                        .validator(validate_seconds),
                )
                .arg(
                    Arg::with_name("active")
                        .help("Requested active time in seconds")
                        .required(true)
                        .validator(validate_seconds),
                ),
        )
        .subcommand(
            SubCommand::with_name("context")
                .about("🌐 Create and define a packet data context")
                .arg(
                    Arg::with_name("apn")
                        .help("Access point name")
                        .required(false),
                ),
        )
        .get_matches();

    let verbose = matches.is_present("verbose");
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = load_config(&matches)?;
    let script = LoopbackScript::with_defaults();
    script_sim_state(&script, matches.value_of("sim").unwrap_or("ready"));

    let mut device = CellularDevice::new(config, Box::new(LoopbackFactory::new(script.clone())))?;
    device.init_module()?;

    println!("{}", "📶 Cellular device probe".bright_blue().bold());
    println!("{} {}", "Link:".dimmed(), device.pool().default_link());

    let outcome = match matches.subcommand() {
        ("probe", Some(_)) => handle_probe(&mut device),
        ("info", Some(_)) => handle_info(&mut device),
        ("pin", Some(sub)) => handle_pin(&mut device, sub),
        ("psm", Some(sub)) => handle_psm(&mut device, sub),
        ("context", Some(sub)) => handle_context(&mut device, sub),
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Check readiness and SIM state", "cellular-probe probe".bright_cyan());
            println!("  {} Request power saving", "cellular-probe psm 3600 60".bright_cyan());
            Ok(())
        }
    };

    if let Err(e) = outcome {
        println!("{} {}", "❌".red(), e.to_string().bright_red());
    }

    if matches.is_present("transcript") {
        println!("\n{}", "AT transcript".bright_blue().bold());
        for entry in script.entries() {
            println!("  {} {}", entry.link.to_string().dimmed(), entry.line.bright_white());
        }
    }

    device.shutdown();
    debug!(alive = script.channels_alive(), "channels left after shutdown");
    Ok(())
}

fn validate_seconds(v: String) -> Result<(), String> {
    match v.parse::<u32>() {
        Ok(_) => Ok(()),
        Err(_) => Err("Duration must be a non-negative number of seconds".into()),
    }
}

fn load_config(matches: &ArgMatches<'_>) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => DeviceConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => DeviceConfig::default(),
    };
    if let Some(link) = matches.value_of("link") {
        config.default_link = link.to_string();
    }
    if let Some(timeout) = matches.value_of("timeout") {
        config.default_timeout_ms = timeout.parse()?;
    }
    if matches.is_present("debug") {
        config.modem_debug = true;
    }
    config.validate()?;
    info!(link = %config.default_link, timeout_ms = config.default_timeout_ms, "configuration loaded");
    Ok(config)
}

fn script_sim_state(script: &LoopbackScript, state: &str) {
    let reply = match state {
        "pin" => Reply::line("+CPIN: SIM PIN"),
        "puk" => Reply::line("+CPIN: SIM PUK"),
        "absent" => Reply::error(DeviceError::Device),
        _ => Reply::line("+CPIN: READY"),
    };
    script.reply("AT+CPIN?", reply);
}

fn describe_sim(state: SimState) -> ColoredString {
    match state {
        SimState::Ready => "ready".bright_green(),
        SimState::PinNeeded => "PIN required".yellow(),
        SimState::PukNeeded => "PUK required".bright_red(),
        SimState::Unknown => "unknown".dimmed(),
    }
}

fn handle_probe(device: &mut CellularDevice) -> Result<(), DeviceError> {
    match device.is_ready() {
        Ok(()) => println!("{} {}", "✅".green(), "Modem is responsive".bright_green()),
        Err(e) => println!("{} Modem not responsive: {}", "❌".red(), e.to_string().bright_red()),
    }

    let (state, result) = device.sim_state();
    println!("{} {}", "SIM:".bright_white(), describe_sim(state));
    result
}

fn handle_info(device: &mut CellularDevice) -> Result<(), DeviceError> {
    let information = device.open_information(None)?;
    let rows = [
        ("Manufacturer", information.manufacturer()),
        ("Model", information.model()),
        ("Revision", information.revision()),
        ("IMEI", information.serial_number()),
    ];
    device.close_information();

    println!("\n{}", "📇 Device Information".bright_blue().bold());
    for (label, value) in rows {
        match value {
            Ok(value) => println!("  {:<14} {}", label.bright_white(), value.as_str().bright_cyan()),
            Err(e) => println!("  {:<14} {}", label.bright_white(), e.to_string().bright_red()),
        }
    }
    Ok(())
}

fn handle_pin(device: &mut CellularDevice, matches: &ArgMatches<'_>) -> Result<(), DeviceError> {
    device.set_pin(matches.value_of("pin"))?;
    println!("{} {}", "✅".green(), "SIM unlocked".bright_green());
    Ok(())
}

fn handle_psm(device: &mut CellularDevice, matches: &ArgMatches<'_>) -> Result<(), DeviceError> {
    let periodic = parse_seconds(matches.value_of("periodic"))?;
    let active = parse_seconds(matches.value_of("active"))?;

    if periodic == 0 && active == 0 {
        device.set_power_save_mode(0, 0)?;
        println!("{} {}", "✅".green(), "Power saving disabled".bright_green());
        return Ok(());
    }

    let periodic_ie = psm::encode_periodic(periodic);
    let active_ie = psm::encode_active(active);
    println!("{} {}s → {}", "Periodic TAU:".bright_white(), periodic, periodic_ie.to_string().bright_cyan());
    println!("{} {}s → {}", "Active time: ".bright_white(), active, active_ie.to_string().bright_cyan());

    match device.set_power_save_mode(periodic, active) {
        Ok(()) => println!("{} {}", "✅".green(), "Power saving requested".bright_green()),
        Err(e) => println!("{} Request refused by modem: {}", "⚠️".yellow(), e.to_string().yellow()),
    }
    Ok(())
}

fn handle_context(device: &mut CellularDevice, matches: &ArgMatches<'_>) -> Result<(), DeviceError> {
    let id = device.create_context(None, matches.value_of("apn"))?;
    let result = match device.context_mut(id) {
        Some(context) => context.define(),
        None => Err(DeviceError::Device),
    };
    if let Some(context) = device.context(id) {
        println!(
            "{} {} apn={}",
            "🌐".bright_blue(),
            id.to_string().bright_white(),
            context.apn().unwrap_or("-").bright_cyan()
        );
    }
    device.delete_context(id);
    result
}

fn parse_seconds(value: Option<&str>) -> Result<u32, DeviceError> {
    value
        .ok_or(DeviceError::Parameter)?
        .parse()
        .map_err(|_| DeviceError::Parameter)
}
