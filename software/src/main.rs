use anyhow::{Context, Result, anyhow};
use common::codec::CipherKey;
use common::messages::StatusSchema;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;

mod monitor;
mod profile;
mod sim;

const USAGE: &str = "\
rclink monitor [--port PORT] [--baud BAUD] [--replay FILE]
    Print the diagnostic stream of a handset or vehicle.

rclink sim [--ticks N] [--seed S] [--loss P] [--corrupt P] [--profile FILE]
           [--key KEY] [--extended] [--dump FILE]
    Run both ends of the link against a simulated radio.";

// Same key the firmware falls back to when RCLINK_CIPHER_KEY is unset
const DEFAULT_KEY: &str = "rclink-dev-key";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        println!("{USAGE}");
        return Ok(());
    }

    match pargs.subcommand()?.as_deref() {
        Some("monitor") => {
            let replay: Option<PathBuf> = pargs.opt_value_from_str("--replay")?;
            let port: Option<String> = pargs.opt_value_from_str("--port")?;
            let baud: u32 = pargs.opt_value_from_str("--baud")?.unwrap_or(115_200);
            warn_unused(pargs);

            match replay {
                Some(path) => {
                    let bytes = fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let n = monitor::replay(&bytes);
                    info!("Replayed {} messages from {}", n, path.display());
                    Ok(())
                }
                None => monitor::run(port, baud),
            }
        }
        Some("sim") => {
            let ticks: u32 = pargs.opt_value_from_str("--ticks")?.unwrap_or(10_000);
            let seed: u64 = pargs.opt_value_from_str("--seed")?.unwrap_or(0);
            let loss: f64 = pargs.opt_value_from_str("--loss")?.unwrap_or(0.0);
            let corrupt: f64 = pargs.opt_value_from_str("--corrupt")?.unwrap_or(0.0);
            let key: String = pargs
                .opt_value_from_str("--key")?
                .unwrap_or(String::from(DEFAULT_KEY));
            let profile_path: Option<PathBuf> = pargs.opt_value_from_str("--profile")?;
            let dump: Option<PathBuf> = pargs.opt_value_from_str("--dump")?;
            let schema = if pargs.contains("--extended") {
                StatusSchema::Extended
            } else {
                StatusSchema::Narrow
            };
            warn_unused(pargs);

            if !(0.0..=1.0).contains(&loss) || !(0.0..=1.0).contains(&corrupt) {
                return Err(anyhow!("--loss and --corrupt are probabilities in 0..=1"));
            }
            let key = CipherKey::new(key.as_bytes()).map_err(|e| anyhow!("--key: {e}"))?;
            let profile = match profile_path {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    profile::parse_profile(&text)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => profile::Profile::constant(64),
            };
            info!("Read profile with {} points", profile.len());

            let options = sim::SimOptions {
                ticks,
                seed,
                loss,
                corrupt,
                schema,
                key,
                profile,
            };
            let outcome = sim::run(&options)?;
            println!("{}", outcome.report);

            if let Some(path) = dump {
                fs::write(&path, &outcome.diag_stream)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Written vehicle diagnostic stream to {}", path.display());
            }
            Ok(())
        }
        Some(other) => Err(anyhow!("unknown command `{other}`\n\n{USAGE}")),
        None => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

fn warn_unused(pargs: pico_args::Arguments) {
    let rest = pargs.finish();
    if !rest.is_empty() {
        warn!("Ignoring arguments {:?}", rest);
    }
}
