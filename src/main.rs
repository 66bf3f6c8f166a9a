use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use global_event_system::{
    EventBus, EventContext, EventKey, EventRecorder, FunctionReceiver, FunctionSignature, GlobalOptions,
    ListenerError, StructValue, TypeTag, WildcardValue,
};

/// Walks through binding, emitting and pinning on a fresh event bus
#[derive(Parser, Debug)]
#[command(name = "ges-demo", version, about)]
struct Args {
    /// JSON file with event system options (defaults come from the GES_* environment variables)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Log routine bind/emit traffic at info level
    #[arg(long)]
    verbose: bool,

    /// Deliver payloads without checking receiving function signatures
    #[arg(long)]
    no_verify: bool,

    /// Score to emit and pin
    #[arg(long, default_value_t = 42)]
    score: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Loot {
    item: String,
    gold: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut options = match &args.options {
        Some(path) => GlobalOptions::from_json_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => GlobalOptions::from_env(),
    };
    options.verbose_logging |= args.verbose;
    if args.no_verify {
        options.verify_parameter_types = false;
    }

    let bus = EventBus::new(options);
    let ctx = EventContext::new("ges-demo");
    let score = EventKey::global("Score");
    let loot = EventKey::new("inventory", "Loot");

    // A HUD that prints scores and loot
    let hud = Arc::new(
        FunctionReceiver::new("hud")
            .with_function("OnScore", FunctionSignature::typed(TypeTag::Int), |payload| {
                let value = payload
                    .ok_or_else(|| ListenerError::Failed("score without payload".into()))?
                    .to_int()?;
                println!("HUD: score is now {}", value);
                Ok(())
            })
            .with_function("OnLoot", FunctionSignature::structure("Loot"), |payload| {
                if let Some(value) = payload {
                    let loot: Loot = value.to_struct()?;
                    println!("HUD: picked up {} worth {} gold", loot.item, loot.gold);
                }
                Ok(())
            }),
    );
    bus.bind(&ctx, &score, &hud, "OnScore")?;
    bus.bind(&ctx, &loot, &hud, "OnLoot")?;

    bus.emit(&ctx, true, &score, args.score)?;
    let report = bus.emit(
        &ctx,
        false,
        &loot,
        StructValue::from_serde("Loot", &Loot { item: "sword".into(), gold: 12 })?,
    )?;
    info!("Loot emission: {:?}", report);

    // Joins after the score was pinned and still sees it
    let recorder = EventRecorder::new(16);
    bus.bind_to_delegate(&ctx, &recorder.delegate(), &score)?;
    for event in recorder.history() {
        let payload = event.payload.as_ref().map(WildcardValue::to_int);
        println!("Late listener got {:?} at {}", payload, event.received_at);
    }

    if let Err(err) = bus.emit(&ctx, true, &score, args.score + 1) {
        println!("Second pin rejected: {}", err);
    }
    bus.unpin(&ctx, &score);
    bus.emit(&ctx, true, &score, args.score + 1)?;

    bus.unbind_receiver(&ctx, &hud);
    info!("Done, {} listener(s) left on {}", bus.listener_count(&score), score);
    Ok(())
}
