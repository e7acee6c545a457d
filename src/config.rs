use crate::controller::{ProgressPolicy, SessionConfig};
use crate::prompt::PromptContext;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 网络配置
    pub ws_url: &'static str,
    pub chat_url: &'static str,
    pub live_model: &'static str,
    pub chat_model: &'static str,
    pub voice_name: &'static str,

    // 密钥（动态部分，可在运行时由环境变量覆盖）
    pub api_key: String,

    // 音频配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub output_channels: u16,
    pub playback_period_size: usize,

    // 默认课程上下文
    pub lesson_title: &'static str,
    pub lesson_objective: &'static str,

    pub progress_policy: ProgressPolicy,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            ws_url: env!("WS_URL"),
            chat_url: env!("CHAT_URL"),
            live_model: env!("LIVE_MODEL"),
            chat_model: env!("CHAT_MODEL"),
            voice_name: env!("VOICE_NAME"),

            api_key: env!("API_KEY").to_string(),

            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            input_sample_rate: env!("INPUT_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse INPUT_SAMPLE_RATE")?,
            output_sample_rate: env!("OUTPUT_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse OUTPUT_SAMPLE_RATE")?,
            frame_size: env!("FRAME_SIZE").parse()
                .map_err(|_| "Failed to parse FRAME_SIZE")?,
            output_channels: env!("OUTPUT_CHANNELS").parse()
                .map_err(|_| "Failed to parse OUTPUT_CHANNELS")?,
            playback_period_size: env!("PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,

            lesson_title: env!("LESSON_TITLE"),
            lesson_objective: env!("LESSON_OBJECTIVE"),

            progress_policy: env!("PROGRESS_POLICY").parse()
                .map_err(|_| "Failed to parse PROGRESS_POLICY")?,
        })
    }

    /// 运行时覆盖：环境变量中的密钥优先于编译时的值
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            let key = key.trim();
            if !key.is_empty() {
                self.api_key = key.to_string();
            }
        }
    }

    /// Parameters the session controller needs, detached from the baked config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
            frame_size: self.frame_size,
            output_channels: self.output_channels,
            live_model: self.live_model.to_string(),
            voice_name: self.voice_name.to_string(),
            progress_policy: self.progress_policy,
        }
    }

    pub fn default_lesson(&self) -> PromptContext {
        PromptContext::new(self.lesson_title, self.lesson_objective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baked_config_parses() {
        let config = Config::new().expect("config.toml should be valid");
        assert!(config.frame_size > 0);
        assert!(config.input_sample_rate > 0);
        assert!(config.output_channels >= 1);

        let session = config.session_config();
        assert_eq!(session.frame_size, config.frame_size);
        assert_eq!(session.output_sample_rate, config.output_sample_rate);
    }
}
