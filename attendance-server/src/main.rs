use std::net::SocketAddr;
use std::path::PathBuf;

use structopt::StructOpt;

use attendance::transport::hyper::HyperHttpTransport;
use attendance::transport::Transport;
use attendance::{AttendanceService, TrackerConfig};

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");

#[derive(StructOpt, Debug)]
#[structopt(name = "attendance-server")]
struct Opt {
    /// Address the HTTP server listens on
    #[structopt(short, long, default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// SQLite file holding the attendance log
    #[structopt(short, long, default_value = "attendance.db", parse(from_os_str))]
    database: PathBuf,

    /// Latitude of the reference point in decimal degrees
    #[structopt(long, default_value = "21.498221", allow_hyphen_values = true)]
    latitude: f64,

    /// Longitude of the reference point in decimal degrees
    #[structopt(long, default_value = "83.904285", allow_hyphen_values = true)]
    longitude: f64,

    /// Distance from the reference point in meters that still counts as present
    #[structopt(short, long, default_value = "10")]
    threshold: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    log::debug!("Commandline options: {:?}", opt);

    let config = TrackerConfig::new(opt.latitude, opt.longitude, opt.threshold, opt.database)?;
    log::info!(
        "Tracking attendance within {}m of {}",
        config.threshold_meters,
        config.reference
    );
    let service = AttendanceService::open(config)?;

    let hyper_transport = HyperHttpTransport::new(opt.bind)
        .with_asset("/", "text/html; charset=utf-8", INDEX_HTML)
        .with_asset("/index.html", "text/html; charset=utf-8", INDEX_HTML)
        .with_asset(
            "/static/script.js",
            "application/javascript; charset=utf-8",
            SCRIPT_JS,
        );
    hyper_transport.run(service)?;

    Ok(())
}
