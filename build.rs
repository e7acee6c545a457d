use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    network: Network,
    audio: Audio,
    lesson: Lesson,
    session: Session,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    chat_url: String,
    api_key: String,
    live_model: String,
    chat_model: String,
    voice_name: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    input_sample_rate: u32,
    output_sample_rate: u32,
    frame_size: usize,
    output_channels: u16,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Lesson {
    title: String,
    objective: String,
}

#[derive(Deserialize)]
struct Session {
    progress_policy: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=CHAT_URL={}", config.network.chat_url);
    println!("cargo:rustc-env=API_KEY={}", config.network.api_key);
    println!("cargo:rustc-env=LIVE_MODEL={}", config.network.live_model);
    println!("cargo:rustc-env=CHAT_MODEL={}", config.network.chat_model);
    println!("cargo:rustc-env=VOICE_NAME={}", config.network.voice_name);

    // 音频配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=INPUT_SAMPLE_RATE={}", config.audio.input_sample_rate);
    println!("cargo:rustc-env=OUTPUT_SAMPLE_RATE={}", config.audio.output_sample_rate);
    println!("cargo:rustc-env=FRAME_SIZE={}", config.audio.frame_size);
    println!("cargo:rustc-env=OUTPUT_CHANNELS={}", config.audio.output_channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);

    // 课程上下文
    println!("cargo:rustc-env=LESSON_TITLE={}", config.lesson.title);
    println!("cargo:rustc-env=LESSON_OBJECTIVE={}", config.lesson.objective);

    println!("cargo:rustc-env=PROGRESS_POLICY={}", config.session.progress_policy);
}
