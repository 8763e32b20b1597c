// Producer on a dedicated thread pushes timestamps over the bus; a pooled
// consumer pulls them back out through a bridge.
use chrono::{DateTime, Utc};
use common::{init_logging, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;
use theater::{
    BridgeCause, Bus, CauseExt, ChainBehavior, Character, Effect, FnBehavior, NowCause,
    PoolCharacter, PushMessage, TheaterConfig, ThreadCharacter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::verbose())?;

    let config = TheaterConfig::from_env();
    config.validate()?;

    let bus = Bus::new();
    let bridge = Arc::new(BridgeCause::<String>::new());
    bridge.attach(&bus);

    let outbox = bus.clone();
    let producer = ThreadCharacter::with_config(
        NowCause.with_pause(Duration::from_millis(250), true)?,
        FnBehavior::named("publish", move |effect: &Effect| {
            if let Some(at) = effect.downcast_ref::<DateTime<Utc>>() {
                outbox.send(PushMessage::new(at.to_rfc3339()));
            }
            Ok(())
        }),
        config.character.clone(),
    )?;

    let consumer_behavior = ChainBehavior::default();
    consumer_behavior.add_type_link::<String, _, _>(|| {
        FnBehavior::named("print", |effect: &Effect| {
            if let Some(stamp) = effect.downcast_ref::<String>() {
                println!("consumed {stamp}");
            }
            Ok(())
        })
    });

    let consumer = PoolCharacter::new(
        Arc::clone(&bridge)
            .with_pause(Duration::from_millis(50), true)?
            .with_required()
            .with_debug(),
        consumer_behavior,
        config.pool.clone(),
    )?;

    println!("producer: {}", producer.describe());
    println!("consumer: {}", consumer.describe());

    consumer.start().await?;
    producer.start().await?;

    tokio::time::sleep(Duration::from_secs(3)).await;

    producer.dispose().await?;
    consumer.dispose().await?;
    bridge.detach(&bus);

    Ok(())
}
