//! Incoming Call Flow Example
//!
//! Walks one incoming call through the call core using the in-memory
//! platform collaborators:
//!
//! 1. the socket and a push both announce the same call
//! 2. the native call UI fails, so the notification fallback rings
//! 3. the user answers, then the peer hangs up
//! 4. a late duplicate push arrives and is ignored
//!
//! Run with: cargo run --example incoming_call_flow --features mock-platform
//! (`RUST_LOG=debug` shows every decision the core makes)

use std::sync::Arc;

use anyhow::Context;
use callsync_client_core::error::PlatformError;
use callsync_client_core::logging::{setup_logging, LoggingConfig};
use callsync_client_core::mock::{
    MockNativeBackend, RecordingNavigator, RecordingPresenter, RecordingTransport,
    RecordingVibrator,
};
use callsync_client_core::platform::Platform;
use callsync_client_core::{CallCoreBuilder, SignalSource};
use serde_json::json;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(LoggingConfig::default())?;

    println!("📞 Incoming Call Flow Example");
    println!("=============================");

    let native = Arc::new(
        MockNativeBackend::new().with_display_error(PlatformError::api("reportNewIncomingCall", "denied")),
    );
    let presenter = Arc::new(RecordingPresenter::new());
    let vibrator = Arc::new(RecordingVibrator::new());
    let transport = Arc::new(RecordingTransport::connected());
    let navigator = Arc::new(RecordingNavigator::new());

    let core = CallCoreBuilder::new()
        .user_phone("+49 170 5678")
        .platform(Platform::Ios)
        .native_backend(native.clone())
        .presenter(presenter.clone())
        .vibrator(vibrator.clone())
        .transport(transport.clone())
        .navigator(navigator.clone())
        .build()
        .context("failed to build call core")?;

    let mut events = core.state_manager().events();
    let printer = tokio::spawn(async move {
        while let Some(Ok(event)) = events.next().await {
            println!("   📣 {}", event);
        }
    });

    core.start().await.context("failed to start call core")?;
    println!("✅ Started, sent: {:?}", transport.sent_events());

    println!("\n🔔 Socket announces call_demo");
    core.handle_wire_event("incomingCall", json!({ "from": "+491234", "channel": "call_demo" }))
        .await?;

    println!("🔔 Push announces call_demo as well");
    let push = json!({
        "type": "incoming_call",
        "callerPhone": "+491234",
        "calleePhone": "+491705678",
        "channel": "call_demo",
        "callerName": "Anna",
    });
    let outcome = core.handle_push_payload(&push, SignalSource::Push).await?;
    println!("   Push outcome admitted: {:?}", outcome.map(|o| o.is_admitted()));
    println!(
        "   Notifications shown: {}, vibrating: {}",
        presenter.presented_notifications().len(),
        vibrator.is_vibrating()
    );

    println!("\n✋ User answers");
    let answered = core.answer_call().await;
    println!("   Answered: {}, vibrating: {}", answered.is_transitioned(), vibrator.is_vibrating());

    println!("\n👋 Peer hangs up");
    core.handle_wire_event("callEnded", json!({ "channel": "call_demo" }))
        .await?;

    println!("\n📨 Late VoIP push for the same call");
    let late = core
        .handle_push_payload(&push, SignalSource::VoipPush)
        .await?
        .context("push was not a call signal")?;
    println!("   Late push admitted: {}", late.is_admitted());

    println!("\n🧭 Navigation: {:?}", navigator.events());
    println!("📜 History: {} call(s)", core.state_manager().call_history().len());

    core.shutdown().await;
    drop(core);
    printer.abort();

    println!("\n🎉 Done");
    Ok(())
}
