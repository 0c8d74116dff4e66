use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::server::SurveyServer;
use crate::sms::TwilioSender;

/// Run the HTTP server until Ctrl+C.
pub fn run_serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.port = port;
    }

    let sender = TwilioSender::new(config.sms.clone(), config.sms_timeout)?;
    let server = SurveyServer::new(config, Arc::new(sender))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc_handler(shutdown.clone());

    println!("Press Ctrl+C to stop");
    server.start(shutdown)?;
    println!("Server stopped");
    Ok(())
}

fn ctrlc_handler(shutdown: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        info!("received Ctrl+C, shutting down");
        shutdown.store(true, Ordering::SeqCst);
    });
}
