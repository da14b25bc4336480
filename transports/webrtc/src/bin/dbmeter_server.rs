//! DBMeter signaling server entry point
//!
//! Serves the WebSocket signaling endpoint; browsers send an SDP offer, stream
//! camera video over WebRTC and receive the recognized meter readings.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: ws://0.0.0.0:8000/webrtc-signaling, 0.5s interval, range 0-200
//! cargo run --bin dbmeter_server --features h264
//!
//! # Wide counter display, whole-frame recognition, one reading per second
//! cargo run --bin dbmeter_server --features h264 -- \
//!   --valid-range 0:999999 \
//!   --no-roi \
//!   --detection-interval 1.0
//!
//! # Configure STUN/TURN servers
//! cargo run --bin dbmeter_server -- \
//!   --stun-servers stun:stun.l.google.com:19302 \
//!   --turn-servers turn:relay.example.com:3478:user:secret
//! ```

use clap::Parser;
use dbmeter_core::{RoiPolicy, TesseractCli, ValidationRange};
use dbmeter_webrtc::{
    ConnectionRegistry, ServerConfig, TurnServerConfig, WebRtcTransportFactory,
    WebSocketSignalingServer,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// DBMeter signaling server
///
/// Reads numbers from browser video over WebRTC and streams them back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address for the signaling WebSocket
    #[arg(long, default_value = "0.0.0.0:8000", env = "DBMETER_BIND_ADDRESS")]
    bind_address: String,

    /// Request path accepted for WebSocket upgrades
    #[arg(long, default_value = "/webrtc-signaling", env = "DBMETER_SIGNALING_PATH")]
    signaling_path: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302",
        env = "DBMETER_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "DBMETER_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = 64, env = "DBMETER_MAX_SESSIONS")]
    max_sessions: usize,

    /// Seconds to wait for ICE gathering before answering
    #[arg(long, default_value_t = 10, env = "DBMETER_ICE_GATHERING_TIMEOUT")]
    ice_gathering_timeout_secs: u64,

    /// Minimum seconds between two recognitions on one connection
    #[arg(long, default_value_t = 0.5, env = "DBMETER_DETECTION_INTERVAL")]
    detection_interval: f64,

    /// Accepted numeric range as lower:upper (0:200 for a sound level meter, 0:999999 for counters)
    #[arg(long, default_value = "0:200", env = "DBMETER_VALID_RANGE")]
    valid_range: ValidationRange,

    /// ROI width as a fraction of the frame width
    #[arg(long, default_value_t = 0.2, env = "DBMETER_ROI_WIDTH_RATIO")]
    roi_width_ratio: f64,

    /// ROI height as a fraction of the frame height
    #[arg(long, default_value_t = 0.18, env = "DBMETER_ROI_HEIGHT_RATIO")]
    roi_height_ratio: f64,

    /// Extra pixels around the ROI
    #[arg(long, default_value_t = 0, env = "DBMETER_ROI_PADDING")]
    roi_padding: u32,

    /// Use the browser overlay layout (60% of the frame plus 40px padding)
    #[arg(long, conflicts_with_all = ["roi_width_ratio", "roi_height_ratio", "roi_padding"])]
    overlay_roi: bool,

    /// Recognize the whole frame until a client enables the ROI
    #[arg(long, env = "DBMETER_NO_ROI")]
    no_roi: bool,

    /// Shortest bare integer reported (1 also reports single digits)
    #[arg(long, default_value_t = 2, env = "DBMETER_MIN_INTEGER_DIGITS")]
    min_integer_digits: usize,

    /// Tesseract executable
    #[arg(long, default_value = "tesseract", env = "DBMETER_TESSERACT")]
    tesseract: String,
}

/// Parse TURN server string (format: turn:host:port:username:password or turns:host:port:username:password)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        // Password may contain colons
        credential: parts[4..].join(":"),
    })
}

/// Build ServerConfig from CLI arguments
fn build_config_from_args(args: &Args) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig {
        bind_address: args.bind_address.clone(),
        signaling_path: args.signaling_path.clone(),
        stun_servers: args.stun_servers.clone(),
        max_sessions: args.max_sessions,
        ice_gathering_timeout_secs: args.ice_gathering_timeout_secs,
        recognizer_program: args.tesseract.clone(),
        ..Default::default()
    };

    let mut turn_servers = Vec::new();
    for turn_str in &args.turn_servers {
        let turn_config = parse_turn_server(turn_str)
            .map_err(|e| format!("Failed to parse TURN server: {}", e))?;
        info!(
            "Adding TURN server: {} (user: {})",
            turn_config.url, turn_config.username
        );
        turn_servers.push(turn_config);
    }
    config = config.with_turn_servers(turn_servers);

    config.extractor.roi = if args.overlay_roi {
        RoiPolicy::overlay()
    } else {
        RoiPolicy {
            width_ratio: args.roi_width_ratio,
            height_ratio: args.roi_height_ratio,
            padding_px: args.roi_padding,
        }
    };
    config.extractor.roi_enabled = !args.no_roi;
    config.extractor.detection_interval_secs = args.detection_interval;
    config.extractor.valid_range = args.valid_range;
    config.extractor.min_integer_digits = args.min_integer_digits;

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutting_down = Arc::new(AtomicBool::new(false));

    ctrlc::set_handler(move || {
        if shutting_down.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(130);
        }
        eprintln!("Ctrl+C received, shutting down (press again to force)");
        let _ = shutdown_tx.send(true);
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dbmeter-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_rx))
}

async fn async_main(
    args: Args,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        h264 = cfg!(feature = "h264"),
        "DBMeter server starting"
    );

    let config = Arc::new(build_config_from_args(&args)?);
    info!(
        "Extractor: interval {}s, range {}..{}, ROI {:?} (enabled: {})",
        config.extractor.detection_interval_secs,
        config.extractor.valid_range.lower,
        config.extractor.valid_range.upper,
        config.extractor.roi,
        config.extractor.roi_enabled
    );

    let recognizer = TesseractCli::new(&config.recognizer_program);
    if let Err(e) = recognizer.probe().await {
        warn!(
            "Tesseract OCR is not available ({}); every frame will yield no numbers",
            e
        );
    }

    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(WebRtcTransportFactory::new(config.ice_gathering_timeout())),
        Arc::new(recognizer),
        config.ice_servers(),
        config.extractor.clone(),
        config.max_sessions,
    ));

    let server = WebSocketSignalingServer::new(Arc::clone(&config), Arc::clone(&registry))
        .start()
        .await?;
    info!(
        "Signaling endpoint ready at ws://{}{}",
        server.local_addr(),
        config.signaling_path
    );

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    server.shutdown().await;
    info!(
        "DBMeter server shut down gracefully ({} connections left)",
        registry.connection_count().await
    );

    Ok(())
}

fn init_tracing() {
    // RUST_LOG wins; otherwise info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
