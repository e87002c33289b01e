#![warn(missing_docs)]

//! Cloudflare worker running the apex ladder and match ingestion pipeline.

use worker::{
    event, Context, Env, Error, MessageBatch, MessageExt, Result, ScheduleContext, ScheduledEvent,
};

pub mod d1;
pub mod init;
pub mod sleep;
pub mod webjob;

/// Cron handler: queue the daily update, then the checkpoint audit.
#[event(scheduled)]
pub async fn scheduled(event: ScheduledEvent, env: Env, _ctx: ScheduleContext) {
    init::init_logging(&env);
    log::info!("Scheduled event `{}`.", event.cron());

    let result = async {
        let queue = env.queue(init::BINDING_QUEUE_WEBJOB)?;
        queue.send(webjob::Task::DailyUpdate).await?;
        queue.send(webjob::Task::AuditCheckpoints).await?;
        Result::Ok(())
    }
    .await;
    if let Err(e) = result {
        log::error!("Failed to queue scheduled tasks: {}", e);
    }
}

/// Cloudflare queue handler. Tasks run one at a time, in delivery order.
#[event(queue)]
pub async fn queue(
    message_batch: MessageBatch<webjob::Task>,
    env: Env,
    _ctx: Context,
) -> Result<()> {
    init::init_logging(&env);

    let mut errors = Vec::new();
    for msg in message_batch.messages()? {
        log::info!("Handling webjob task: `{:?}`.", msg.body());
        match webjob::handle(&env, msg).await {
            Ok(msg) => msg.ack(),
            Err(e) => errors.push(e),
        }
    }

    log::info!("Handling webjob task complete. Errors: {:?}", errors);
    errors
        .is_empty()
        .then_some(())
        .ok_or(Error::RustError(format!("{:?}", errors)))
}
