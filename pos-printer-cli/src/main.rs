//! pos-printer: receipt printer command line
//!
//! - Print text, receipts and test pages
//! - Detect the driver for a device name
//! - Scan LAN, USB and Bluetooth for printers
//! - Register Bluetooth printers with CUPS

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pos_printer::discovery::{self, DiscoveredDevice};
use pos_printer::driver::identify_lan_brand;
use pos_printer::profile::RAW_PORT;
use pos_printer::{
    BrandDescriptor, ConnectRequest, CupsRegistrar, PaperWidth, PrintReport, PrinterAddress,
    PrinterManager, PrinterSettings, Receipt, ReceiptLine, SystemRunner, TransportKind,
    TransportOptions, build_frame, select_driver,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pos-printer", version, about = "Brand-agnostic ESC/POS receipt printing.")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print text (argument or stdin).
    Print {
        #[command(flatten)]
        printer: PrinterArgs,
        /// Text to print; read from stdin when omitted.
        text: Option<String>,
    },
    /// Print a receipt described by a JSON file.
    Receipt {
        #[command(flatten)]
        printer: PrinterArgs,
        file: PathBuf,
    },
    /// Print a test page.
    Test {
        #[command(flatten)]
        printer: PrinterArgs,
    },
    /// Show which driver a device name resolves to.
    Detect {
        name: String,
        #[arg(long, default_value = "")]
        address: String,
    },
    /// Dump the ESC/POS bytes for a text as hex.
    Frame {
        text: String,
        /// Device name used to pick the code page.
        #[arg(long, default_value = "")]
        device_name: String,
        #[arg(long, default_value_t = 80)]
        paper_width: u16,
    },
    /// Look for printers.
    Scan(ScanArgs),
    /// Create a CUPS queue for a Bluetooth printer.
    Register {
        name: String,
        mac: String,
        /// Queue name; defaults to the device name.
        #[arg(long)]
        queue: Option<String>,
    },
    /// Remove a CUPS queue.
    Unregister { queue: String },
}

#[derive(Debug, Args)]
struct PrinterArgs {
    /// Printer settings JSON (`type`, `address`, `paper_width`, `cups_name`, `device_name`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// lan, usb, bluetooth or auto.
    #[arg(long = "type", env = "PRINTER_TYPE", default_value = "auto")]
    transport: TransportKind,

    /// IP address, Bluetooth MAC, USB vid:pid or device path.
    #[arg(long, env = "PRINTER_ADDRESS", default_value = "")]
    address: String,

    /// 58 or 80.
    #[arg(long, env = "PRINTER_PAPER_WIDTH", default_value_t = 80)]
    paper_width: u16,

    /// Device name used for brand detection.
    #[arg(long, env = "PRINTER_DEVICE_NAME", default_value = "")]
    device_name: String,

    /// CUPS queue name.
    #[arg(long = "cups-name", env = "PRINTER_CUPS_NAME")]
    cups_queue: Option<String>,

    /// Do not query LAN printers for their maker.
    #[arg(long, default_value_t = false)]
    no_identify: bool,
}

impl PrinterArgs {
    fn request(&self) -> anyhow::Result<ConnectRequest> {
        let request = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                PrinterSettings::from_json(&json)?.to_request()
            }
            None => ConnectRequest {
                transport: self.transport,
                address: self.address.clone(),
                paper_width: PaperWidth::from_mm(self.paper_width),
                device_name: self.device_name.clone(),
                cups_queue: self.cups_queue.clone(),
                identify_brand: true,
            },
        };
        Ok(request.with_identify_brand(!self.no_identify))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScanKind {
    Lan,
    Usb,
    Bluetooth,
}

#[derive(Debug, Args)]
struct ScanArgs {
    kind: ScanKind,

    /// Raw port probed on LAN hosts.
    #[arg(long, default_value_t = RAW_PORT)]
    port: u16,

    /// Ask each LAN printer for its maker.
    #[arg(long, default_value_t = false)]
    identify: bool,

    /// Print results as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenv::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pos_printer=info,pos_printer_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let options = TransportOptions::from_env();

    match cli.cmd {
        Command::Print { printer, text } => {
            let text = match text {
                Some(t) => t,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("reading stdin")?;
                    buf
                }
            };
            let manager = connect(&printer, options).await?;
            let report = manager.print_text(&text).await;
            manager.disconnect().await?;
            show_report(&report?);
        }
        Command::Receipt { printer, file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let receipt: Receipt = serde_json::from_str(&json).context("parsing receipt")?;
            let manager = connect(&printer, options).await?;
            let report = manager.print_receipt(&receipt).await;
            manager.disconnect().await?;
            show_report(&report?);
        }
        Command::Test { printer } => {
            let manager = connect(&printer, options).await?;
            let profile = manager
                .current_config()
                .context("printer disconnected during test")?;
            let receipt = Receipt {
                title: Some("Test Print".to_string()),
                lines: vec![
                    ReceiptLine::new("Driver", profile.brand.name()),
                    ReceiptLine::new("Transport", profile.effective_transport().to_string()),
                    ReceiptLine::new("Paper", format!("{}mm", profile.paper_width.mm())),
                    ReceiptLine::new(
                        "Address",
                        profile.address.map(|a| a.to_string()).unwrap_or_default(),
                    ),
                ],
                footer: Some("Test Print Successful!".to_string()),
                text: None,
            };
            let report = manager.print_receipt(&receipt).await;
            manager.disconnect().await?;
            show_report(&report?);
        }
        Command::Detect { name, address } => {
            let driver = select_driver(&name, &address);
            println!(
                "{} (priority {}, code page {:?})",
                driver.brand_name(),
                driver.priority(),
                driver.code_page()
            );
        }
        Command::Frame {
            text,
            device_name,
            paper_width,
        } => {
            let brand = select_driver(&device_name, "").brand();
            let bytes = build_frame(&text, brand, PaperWidth::from_mm(paper_width));
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}", hex.join(" "));
        }
        Command::Scan(args) => scan(args, &options).await?,
        Command::Register { name, mac, queue } => {
            let registrar = CupsRegistrar::new(Arc::new(SystemRunner), &options);
            if !registrar.is_available().await {
                bail!("CUPS is not running");
            }
            let queue = registrar
                .register_bluetooth_queue(queue.as_deref().unwrap_or(&name), &name, &mac)
                .await?;
            println!("Registered CUPS queue {}", queue);
        }
        Command::Unregister { queue } => {
            CupsRegistrar::new(Arc::new(SystemRunner), &options)
                .unregister(&queue)
                .await?;
            println!("Removed CUPS queue {}", queue);
        }
    }

    Ok(())
}

async fn connect(
    printer: &PrinterArgs,
    options: TransportOptions,
) -> anyhow::Result<PrinterManager> {
    let request = printer.request()?;
    let manager = PrinterManager::new(options);
    let brand = manager.connect(request).await.context("connecting to printer")?;
    info!(%brand, "Ready");
    Ok(manager)
}

fn show_report(report: &PrintReport) {
    if let Some(partial) = report.partial_failure() {
        warn!(error = %partial, "Print incomplete");
    }
    if let Some(encoding) = report.encoding_warning() {
        warn!(error = %encoding, "Some characters could not be encoded");
    }
    println!(
        "Printed {} bytes via {} (cut: {:?}, unmapped characters: {})",
        report.bytes, report.route, report.cut, report.encoding_fallbacks
    );
}

async fn scan(args: ScanArgs, options: &TransportOptions) -> anyhow::Result<()> {
    let mut found = match args.kind {
        ScanKind::Lan => discovery::scan_lan(args.port, options.probe_timeout).await,
        ScanKind::Usb => discovery::scan_usb()?,
        ScanKind::Bluetooth => {
            discovery::scan_bluetooth(&SystemRunner, options.bluetooth_scan_timeout).await?
        }
    };

    if args.identify {
        identify_all(&mut found, options).await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No printers found");
    }
    for device in &found {
        let driver = select_driver(&device.name, &device.address);
        println!("{}  [{}]", device, driver.brand_name());
    }
    Ok(())
}

async fn identify_all(found: &mut [DiscoveredDevice], options: &TransportOptions) {
    for device in found.iter_mut().filter(|d| d.name.is_empty()) {
        if let Ok(PrinterAddress::Lan { ip, port }) = PrinterAddress::parse(&device.address)
            && let Some(maker) =
                identify_lan_brand((ip, port).into(), options.identify_timeout).await
        {
            device.name = maker;
        }
    }
}
