//! Mock PLC binary: `server` hosts a mock MELSEC CPU, `client` drives one.

use std::process;
use std::time::Duration;

use melsec_frame::Series;
use mock_plc::{McClient, Server, ServerConfig};
use plc_device::DeviceRef;

fn usage() -> ! {
    eprintln!("Usage: mock-plc <server|client> [OPTIONS]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --host <addr>        Host to bind/connect [default: 127.0.0.1]");
    eprintln!("  --port <port>        TCP port [default: 5000]");
    eprintln!("  --series <Q|iQ-R>    Frame series [default: Q]");
    eprintln!();
    eprintln!("Server options:");
    eprintln!("  --program <file>     Load a ladder program at startup");
    eprintln!("  --run                Start scanning immediately");
    eprintln!("  --scan-ms <n>        Scan period in milliseconds [default: 10]");
    eprintln!();
    eprintln!("Client operations (after the options):");
    eprintln!("  read <device> [count]    Read 1..n points (D0, M100, X1F, ...)");
    eprintln!("  write <device> <v>...    Write points (bits take 0/1)");
    eprintln!("  model                    Read the CPU model name");
    eprintln!("  run | stop | pause | reset");
    eprintln!("  ping                     Test the connection (reads D0)");
    process::exit(1);
}

struct CliArgs {
    server: bool,
    host: String,
    port: u16,
    series: Series,
    program: Option<String>,
    run: bool,
    scan_ms: u64,
    /// Client operation and its operands.
    op: Vec<String>,
}

fn parse_series(text: &str) -> Series {
    match text.to_ascii_uppercase().as_str() {
        "Q" => Series::Q,
        "IQ-R" | "IQR" => Series::IqR,
        other => {
            eprintln!("Unknown series: {other} (expected Q or iQ-R)");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else { usage() };
    let server = match command.as_str() {
        "server" => true,
        "client" => false,
        "--help" | "-h" => usage(),
        other => {
            eprintln!("Unknown command: {other}");
            usage()
        }
    };

    let mut cli = CliArgs {
        server,
        host: "127.0.0.1".to_string(),
        port: 5000,
        series: Series::Q,
        program: None,
        run: false,
        scan_ms: 10,
        op: Vec::new(),
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                cli.host = args.get(i).cloned().unwrap_or_else(|| usage());
            }
            "--port" => {
                i += 1;
                cli.port = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            "--series" => {
                i += 1;
                cli.series = parse_series(args.get(i).map_or("", String::as_str));
            }
            "--program" => {
                i += 1;
                cli.program = args.get(i).cloned();
            }
            "--run" => cli.run = true,
            "--scan-ms" => {
                i += 1;
                cli.scan_ms = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            "--help" | "-h" => usage(),
            other if other.starts_with("--") => {
                eprintln!("Unknown option: {other}");
                usage();
            }
            _ => {
                cli.op = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    cli
}

fn run_server(cli: &CliArgs) -> i32 {
    let mut config = ServerConfig::for_series(cli.series);
    config.host = cli.host.clone();
    config.port = cli.port;
    config.scan_period = Duration::from_millis(cli.scan_ms.max(1));

    let mut server = match Server::bind(config) {
        Ok(server) => server,
        Err(error) => {
            eprintln!("Cannot bind {}:{}: {error}", cli.host, cli.port);
            return 1;
        }
    };

    if let Some(path) = &cli.program {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("Cannot read {path}: {error}");
                return 1;
            }
        };
        if let Err(error) = server.load_program(&source) {
            eprintln!("Cannot load {path}: {error}");
            return 1;
        }
        println!("Loaded ladder program from {path}");
    }

    if cli.run {
        server.engine().start();
    }

    server.start();
    println!("Mock PLC listening on {} ({} series)", server.local_addr(), cli.series);

    // Serve until the process is killed.
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

fn parse_point(device: DeviceRef, text: &str) -> Result<u16, String> {
    if device.class.is_bit() {
        match text {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(format!("bit value must be 0 or 1, got '{other}'")),
        }
    } else {
        // Accept signed or unsigned word values.
        text.parse::<u16>()
            .or_else(|_| text.parse::<i16>().map(|v| v as u16))
            .map_err(|_| format!("bad word value '{text}'"))
    }
}

fn run_client_op(client: &mut McClient, op: &[String]) -> Result<(), String> {
    match op.first().map(String::as_str) {
        Some("read") => {
            let device = op
                .get(1)
                .ok_or("read needs a device")?
                .parse::<DeviceRef>()
                .map_err(|error| error.to_string())?;
            let count: u16 = op
                .get(2)
                .map_or(Ok(1), |s| s.parse().map_err(|_| "bad count".to_string()))?;
            if device.class.is_bit() {
                let bits = client
                    .read_bits(device.class, device.head, count)
                    .map_err(|error| error.to_string())?;
                let text: Vec<String> = bits.iter().map(|b| u8::from(*b).to_string()).collect();
                println!("{}", text.join(" "));
            } else {
                let words = client
                    .read_words(device.class, device.head, count)
                    .map_err(|error| error.to_string())?;
                let text: Vec<String> = words.iter().map(ToString::to_string).collect();
                println!("{}", text.join(" "));
            }
            Ok(())
        }
        Some("write") => {
            let device = op
                .get(1)
                .ok_or("write needs a device")?
                .parse::<DeviceRef>()
                .map_err(|error| error.to_string())?;
            if op.len() < 3 {
                return Err("write needs at least one value".to_string());
            }
            let values: Result<Vec<u16>, String> = op[2..]
                .iter()
                .map(|text| parse_point(device, text))
                .collect();
            let values = values?;
            if device.class.is_bit() {
                let bits: Vec<bool> = values.iter().map(|v| *v != 0).collect();
                client
                    .write_bits(device.class, device.head, &bits)
                    .map_err(|error| error.to_string())?;
            } else {
                client
                    .write_words(device.class, device.head, &values)
                    .map_err(|error| error.to_string())?;
            }
            println!("OK");
            Ok(())
        }
        Some("model") => {
            let model = client.read_cpu_model().map_err(|error| error.to_string())?;
            println!("{model}");
            Ok(())
        }
        Some("run") => client.remote_run().map_err(|error| error.to_string()),
        Some("stop") => client.remote_stop().map_err(|error| error.to_string()),
        Some("pause") => client.remote_pause().map_err(|error| error.to_string()),
        Some("reset") => client.remote_reset().map_err(|error| error.to_string()),
        Some("ping") => {
            client.test_connection().map_err(|error| error.to_string())?;
            println!("OK");
            Ok(())
        }
        _ => Err("missing or unknown client operation".to_string()),
    }
}

fn run_client(cli: &CliArgs) -> i32 {
    let mut client = McClient::new(&cli.host, cli.port, cli.series);
    if let Err(error) = client.connect() {
        eprintln!("Cannot connect to {}:{}: {error}", cli.host, cli.port);
        return 1;
    }

    let result = run_client_op(&mut client, &cli.op);
    client.disconnect();
    match result {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("{message}");
            1
        }
    }
}

fn main() {
    env_logger::init();
    let cli = parse_args();
    let code = if cli.server {
        run_server(&cli)
    } else {
        run_client(&cli)
    };
    process::exit(code);
}
