use std::sync::Arc;
use std::time::Duration;

use halfduplex::config::HalfDuplexConfig;
use halfduplex::events::LinkEvent;
use halfduplex::handle::PeerHandle;
use halfduplex::peer::Peer;
use halfduplex::serial_link::StreamWriter;
use tracing::{info, Level};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_thread_ids(true)
        .try_init()
        .ok();
}

async fn print_received(name: &'static str, handle: PeerHandle) {
    loop {
        let (header, body) = handle.next_message().await;
        info!("{} received: header {:?}, body {:?}", name, String::from_utf8_lossy(&header), String::from_utf8_lossy(&body));
    }
}

/// Two stations connected by an in-memory pipe in place of a serial line
#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    init_logging();

    let (controller_stream, responder_stream) = tokio::io::duplex(4096);
    let (controller_read, controller_write) = tokio::io::split(controller_stream);
    let (responder_read, responder_write) = tokio::io::split(responder_stream);

    let (controller, controller_handle) = Peer::new(
        Arc::new(HalfDuplexConfig::controller().with_short_timeouts()),
        Arc::new(StreamWriter::new(controller_write)),
    )?;
    let (responder, responder_handle) = Peer::new(
        Arc::new(HalfDuplexConfig::responder().with_short_timeouts()),
        Arc::new(StreamWriter::new(responder_write)),
    )?;

    let controller_loop = tokio::spawn(controller.run(controller_read));
    tokio::spawn(responder.run(responder_read));

    let mut events = controller_handle.subscribe_events();
    tokio::spawn(async move {
        while let Ok(evt) = events.recv().await {
            if !matches!(evt, LinkEvent::StateChanged(_)) {
                info!("controller event: {:?}", evt);
            }
        }
    });

    tokio::spawn(print_received("controller", controller_handle.clone()));
    tokio::spawn(print_received("responder", responder_handle.clone()));

    for i in 0..3 {
        controller_handle.enqueue_message(format!("src=alpha seq={}", i), format!("hello from alpha #{}", i));
        responder_handle.enqueue_message("", format!("hello from bravo #{}", i));
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    controller_handle.shutdown();
    controller_loop.await??;
    Ok(())
}
