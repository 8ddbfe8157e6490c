use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use homework_helper::app::AppConfig;
use homework_helper::export::to_markdown;
use homework_helper::history::{HistoryStore, format_relative};
use homework_helper::image::ImageData;
use homework_helper::logger;
use homework_helper::ocr::OcrService;
use homework_helper::settings::{ProviderKind, Settings, SettingsStore};
use homework_helper::solver::Solver;
use homework_helper::storage::{FileStore, KeyValueStore};
use homework_helper::transport::{HttpTransport, ReqwestTransport};
use homework_helper::vendor::VendorRegistry;
use homework_helper::workflow::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "homework-helper", version, about = "拍照识别作业题目，调用大模型解题并批改答案")]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, env = "HOMEWORK_HELPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 识别图片中的题目并解答
    Analyze {
        image: PathBuf,
        /// 用户自己的答案，提供后会进行批改
        #[arg(long)]
        answer: Option<String>,
        /// 把结果导出为 Markdown 文件
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// 让模型逐项比对用户答案
    Correct {
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long)]
        correct: String,
    },
    #[command(subcommand)]
    History(HistoryCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    Show { id: String },
    Delete { id: String },
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// 切换当前服务商
    Use { provider: ProviderKind },
    /// 设置服务商的某个字段，例如 `set openai apiKey sk-...`
    Set {
        provider: ProviderKind,
        field: String,
        value: String,
    },
    /// 开关答案批改
    Correction { state: Toggle },
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

struct App {
    config: AppConfig,
    settings: SettingsStore,
    history: HistoryStore,
    registry: Arc<VendorRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.data_dir));
        Self {
            settings: SettingsStore::new(store.clone()),
            history: HistoryStore::new(store),
            registry: Arc::new(VendorRegistry::default()),
            transport: Arc::new(ReqwestTransport::default()),
            config,
        }
    }

    fn solver(&self) -> Solver {
        Solver::new(self.registry.clone(), self.transport.clone())
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            OcrService::new(self.registry.clone(), self.transport.clone()),
            self.solver(),
            self.history.clone(),
        )
        .with_timeouts(self.config.ocr_timeout(), self.config.solve_timeout())
    }
}

/// 密钥类字段只显示末尾 4 位
fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

fn print_settings(settings: &Settings) {
    println!("当前服务商: {} ({})", settings.ai_provider.display_name(), settings.ai_provider);
    println!("答案批改: {}", if settings.enable_correction { "开启" } else { "关闭" });
    for provider in ProviderKind::ALL {
        let status = match settings.missing_field(provider) {
            None => "已配置".to_string(),
            Some(field) => format!("缺少 {}", field),
        };
        println!("\n[{}] {}", provider, status);
        for (field, value) in settings.credentials(provider).fields() {
            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            let shown = if provider.required_fields().iter().any(|f| *f == field) { mask(&text) } else { text };
            println!("  {} = {}", field, shown);
        }
    }
}

async fn run(app: App, command: Command) -> Result<()> {
    match command {
        Command::Analyze { image, answer, export } => {
            let settings = app.settings.load()?;
            let image = ImageData::from_path(&image)?;
            let record = app.pipeline().analyze(&settings, image, answer.as_deref()).await?;

            let markdown = to_markdown(&record.answer_set);
            println!("{}", markdown);
            println!("历史记录: {}", record.id);
            if let Some(path) = export {
                fs::write(&path, &markdown)
                    .with_context(|| format!("导出文件失败: {}", path.display()))?;
                info!("📄 已导出到 {}", path.display());
            }
        }
        Command::Correct { question, answer, correct } => {
            let settings = app.settings.load()?;
            let correction = app.solver().smart_correct(&settings, &question, &answer, &correct).await;
            println!("{}", serde_json::to_string_pretty(&correction)?);
        }
        Command::History(cmd) => match cmd {
            HistoryCommand::List => {
                let records = app.history.all()?;
                if records.is_empty() {
                    println!("暂无历史记录");
                }
                let now = Utc::now();
                for record in records {
                    println!(
                        "{}  {}  {} 道题  {}",
                        record.id,
                        format_relative(record.timestamp, now),
                        record.question_count,
                        record.preview_text()
                    );
                }
            }
            HistoryCommand::Show { id } => {
                let Some(record) = app.history.get(&id)? else {
                    bail!("没有找到历史记录: {}", id);
                };
                println!("识别文字:\n{}\n", record.extracted_text);
                println!("{}", to_markdown(&record.answer_set));
            }
            HistoryCommand::Delete { id } => {
                if !app.history.remove(&id)? {
                    bail!("没有找到历史记录: {}", id);
                }
                println!("已删除 {}", id);
            }
            HistoryCommand::Clear => {
                app.history.clear()?;
                println!("已清空历史记录");
            }
        },
        Command::Config(cmd) => {
            let mut settings = app.settings.load()?;
            match cmd {
                ConfigCommand::Show => {
                    print_settings(&settings);
                    return Ok(());
                }
                ConfigCommand::Use { provider } => settings.ai_provider = provider,
                ConfigCommand::Set { provider, field, value } => {
                    settings.credentials_mut(provider).set(&field, value)
                }
                ConfigCommand::Correction { state } => {
                    settings.enable_correction = matches!(state, Toggle::On)
                }
                ConfigCommand::Reset => {
                    app.settings.reset()?;
                    println!("已恢复默认配置");
                    return Ok(());
                }
            }
            app.settings.save(&settings)?;
            if let Err(e) = settings.validate() {
                println!("已保存，但{}", e);
            } else {
                println!("已保存配置");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    logger::init(&config.log_level);
    info!("📁 数据目录: {}", config.data_dir.display());

    run(App::new(config), cli.command).await
}
