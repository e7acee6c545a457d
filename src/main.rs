use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use trainer_voice_relay::chat::TextCoach;
use trainer_voice_relay::config::Config;
use trainer_voice_relay::prompt::{self, PromptContext};

// 命令行未指定时的课程位置
const DEFAULT_PHASE: u32 = 1;
const DEFAULT_WEEK: u32 = 1;

const USAGE: &str = "usage: trainer-relay <voice|chat> [title objective]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().map_err(anyhow::Error::msg)?;
    config.apply_env_overrides();
    log::info!("{} v{} starting", config.app_name, config.app_version);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let lesson = match (args.get(1), args.get(2)) {
        (Some(title), Some(objective)) => PromptContext::new(title.as_str(), objective.as_str()),
        _ => config.default_lesson(),
    };

    match args.first().map(String::as_str) {
        Some("voice") => run_voice(&config, lesson).await,
        Some("chat") => run_chat(&config, lesson).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    }
}

#[cfg(feature = "alsa")]
async fn run_voice(config: &Config, lesson: PromptContext) -> anyhow::Result<()> {
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use trainer_voice_relay::audio::{AlsaMicrophone, AlsaOutput};
    use trainer_voice_relay::{LiveConnector, Notice, SessionController};

    if !lesson.task_type().supports_voice() {
        println!("'{}' is a {} task, voice practice is not available.", lesson.title, lesson.task_type().as_str());
        return Ok(());
    }

    let (tx_notice, mut rx_notice) = mpsc::unbounded_channel::<Notice>();
    let controller = SessionController::new(
        config.session_config(),
        Arc::new(LiveConnector::new(config.ws_url, config.api_key.clone())),
        Box::new(AlsaMicrophone::new(config.capture_device)),
        Box::new(AlsaOutput::new(config.playback_device, config.playback_period_size)),
        tx_notice,
    );
    let (handle, task) = controller.spawn();
    handle.start(lesson.clone()).await?;
    println!("Voice session for '{}' starting. Press Ctrl+C to end.", lesson.title);

    let mut progress = 0u64;
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, ending session...");
                break;
            }
            notice = rx_notice.recv() => {
                match notice {
                    Some(Notice::Active(true)) => println!("Voice Active"),
                    Some(Notice::Active(false)) => {
                        println!("Voice session ended");
                        break;
                    }
                    Some(Notice::Progress) => {
                        progress += 1;
                        log::debug!("Progress signals: {}", progress);
                    }
                    Some(Notice::Failed(e)) => {
                        log::error!("Session failed: {}", e);
                        eprintln!("{}", e.user_message());
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handle.stop().await?;
    // 关闭命令通道，让控制器任务退出
    drop(handle);
    task.await.context("session task panicked")?;
    Ok(())
}

#[cfg(not(feature = "alsa"))]
async fn run_voice(_config: &Config, _lesson: PromptContext) -> anyhow::Result<()> {
    anyhow::bail!("voice mode needs audio devices; rebuild with `--features alsa`")
}

async fn run_chat(config: &Config, lesson: PromptContext) -> anyhow::Result<()> {
    let mut coach = TextCoach::new(
        config.chat_url,
        config.chat_model,
        config.api_key.clone(),
        lesson,
        DEFAULT_PHASE,
        DEFAULT_WEEK,
    );
    let context = coach.context();
    println!("Lesson: {} ({} task)", context.title, context.task_type().as_str());
    if let Some(welcome) = coach.history().first() {
        println!("Coach: {}", welcome.text);
    }
    println!("(type '/draft <text>' to submit a writing draft, Ctrl+D to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut progress = 0u64;
    loop {
        let line = tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else { break };

        let message = match line.strip_prefix("/draft ") {
            Some(draft) => {
                println!("({} words submitted)", prompt::word_count(draft));
                TextCoach::draft_submission(draft)
            }
            None => line,
        };

        if let Some(reply) = coach.send(&message).await {
            println!("Coach: {}", reply.text);
            if reply.progress {
                progress += 1;
                log::debug!("Progress signals: {}", progress);
            }
        }
    }

    println!("Bye");
    Ok(())
}
