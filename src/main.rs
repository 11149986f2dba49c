use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use xtal_meter::session::{self, Operator};
use xtal_meter::sink::{self, XlsxSink};
use xtal_meter::{
    transport, ConsoleOperator, Instrument, SerialInstrument, Session, SessionError, Settings,
    SimulatedAnalyzer,
};

const EXIT_USAGE: u8 = 2;
const EXIT_FAILURE: u8 = 1;
// exit(-1) on Unix.
const EXIT_NO_INSTRUMENT: u8 = 255;

/// XTAL parameter measurement with a spectrum analyzer and tracking generator.
#[derive(Parser, Debug)]
#[command(name = "xtal_cli", disable_help_flag = true)]
struct Args {
    /// Workbook to save the measurements to
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// Number given to the first crystal
    #[arg(short = 'n', long = "number")]
    number: Option<String>,
    /// TOML settings file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Use the built-in simulated analyzer instead of a serial port
    #[arg(long)]
    simulate: bool,
    /// Log instrument traffic
    #[arg(short = 'v', long)]
    verbose: bool,
    /// Print usage and exit
    #[arg(short = 'h', long = "help")]
    help: bool,
}

// The main entry point for the command-line measurement application.
fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };
    if args.help {
        println!("{}", Args::command().render_help());
        return ExitCode::from(EXIT_USAGE);
    }

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    println!("##################################");
    println!("         Rigol DSA815-TG");
    println!("    XTAL Parameter Measurement");
    println!("##################################");
    println!();

    let mut settings = match args.config.as_deref() {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("{}: {}", path.display(), e);
                return ExitCode::from(EXIT_USAGE);
            }
        },
        None => Settings::default(),
    };
    if let Some(file) = args.file {
        settings.output_file = Some(file);
    }
    if let Some(number) = args.number.as_deref() {
        settings.apply_start_number(number);
    }

    let mut instrument: Box<dyn Instrument> = if args.simulate {
        log::info!("using the simulated analyzer");
        Box::new(SimulatedAnalyzer::with_demo_crystals())
    } else {
        let port = match transport::discover(&settings.port_filter) {
            Ok(port) => port,
            Err(e) => {
                log::error!("bad instrument list: {}", e);
                return ExitCode::from(EXIT_NO_INSTRUMENT);
            }
        };
        println!("Connecting to device...");
        match SerialInstrument::open(&port, settings.baud_rate, settings.timeout()) {
            Ok(inst) => {
                println!("Connected on {}", inst.port_name());
                Box::new(inst)
            }
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::from(EXIT_NO_INSTRUMENT);
            }
        }
    };

    let mut operator = ConsoleOperator::stdio();
    let result = session::run(
        &mut instrument,
        &mut operator,
        settings.start_offset(),
        settings.reference_impedance_ohm,
    );
    let session = match result {
        Ok(session) => session,
        Err(SessionError::TrackingGeneratorDisabled) => {
            operator.warn("Tracking generator not enabled");
            operator.inform(
                "Please refer to the usage manual for instructions on how to setup the instrument",
            );
            return ExitCode::from(EXIT_NO_INSTRUMENT);
        }
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    save(&session, &settings, &mut operator)
}

// Saves the session, asking for another file name after every failed attempt
// until one works or the operator gives up with an empty name.
fn save(session: &Session, settings: &Settings, operator: &mut impl Operator) -> ExitCode {
    let mut destination = settings.output_file.clone();
    loop {
        let path = match destination.take() {
            Some(path) => path,
            None => match operator.destination() {
                Ok(name) if !name.is_empty() => PathBuf::from(name),
                Ok(_) => {
                    log::error!("no file name given, {} measurement(s) not saved", session.len());
                    return ExitCode::from(EXIT_FAILURE);
                }
                Err(e) => {
                    log::error!("could not read file name: {}", e);
                    return ExitCode::from(EXIT_FAILURE);
                }
            },
        };

        match sink::persist(session, &settings.sheet_title, &path, &mut XlsxSink) {
            Ok(()) => {
                operator.inform(&format!(
                    "Saved {} measurement(s) to {}",
                    session.len(),
                    path.display()
                ));
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                log::error!("saving to {} failed: {}", path.display(), e);
                operator.warn(&format!("Could not save to {}, choose another file", path.display()));
            }
        }
    }
}
