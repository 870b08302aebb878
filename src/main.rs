use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, Recipient, ReplyParameters};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use robotutor::config::Config;
use robotutor::groq;
use robotutor::tutor::history::HistoryStore;
use robotutor::tutor::replies::{self, MAX_MESSAGE_CHARS};
use robotutor::tutor::router::{self, Destination, MentionDetector};
use robotutor::tutor::{Resolution, Tutor};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
enum Command {
    #[command(description = "Say hello.")]
    Start,
    #[command(description = "Topics you asked about in the last 7 days.")]
    Progress,
    #[command(description = "Your last 10 questions and answers.")]
    History,
}

type TutorState = Arc<Tutor<groq::Client>>;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = std::env::args().nth(1).map(PathBuf::from).or_else(|| {
        let default = PathBuf::from("robotutor.json");
        default.exists().then_some(default)
    });
    let config = match Config::load(config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let _guard = match init_logging(&config.log_dir()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", config.log_dir().display());
            std::process::exit(1);
        }
    };

    info!("🚀 Starting robotutor...");
    match config_path {
        Some(ref path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file, using defaults"),
    }
    info!("Mention triggers: @{} / {:?}", config.bot_username, config.mention_alias);

    let db_path = config.database_path();
    let store = match HistoryStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open database {}: {e}", db_path.display());
            std::process::exit(1);
        }
    };
    if let Err(e) = store.migrate() {
        error!("Failed to migrate database {}: {e}", db_path.display());
        std::process::exit(1);
    }
    info!("History database at {}", db_path.display());

    let client = match groq::Client::new(
        config.groq_api_key.clone(),
        config.api_url.clone(),
        config.model.clone(),
        config.request_timeout,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build completion client: {e}");
            std::process::exit(1);
        }
    };
    info!("Model: {} ({}s timeout)", config.model, config.request_timeout.as_secs());

    let mentions = MentionDetector::new(&config.bot_username, config.mention_alias.as_deref());
    let tutor: TutorState = Arc::new(Tutor::new(client, store, mentions));

    let bot = Bot::new(&config.telegram_token);
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register commands: {e}");
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_callback_query().endpoint(handle_destination))
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.chat.is_group() || msg.chat.is_supergroup())
                .endpoint(handle_group_text),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.chat.is_private())
                .endpoint(handle_private_text),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tutor])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn init_logging(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("robotutor.log"))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    Ok(guard)
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, tutor: TutorState) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    match cmd {
        Command::Start => {
            info!("👋 /start from {} ({})", user.first_name, user_id);
            reply(&bot, msg.chat.id, &replies::greeting(&user.first_name), None).await;
        }
        Command::Progress => {
            let text = tutor.progress(user_id, Utc::now()).unwrap_or_else(|e| {
                error!("Failed to read progress for {user_id}: {e}");
                replies::STORE_UNAVAILABLE.to_string()
            });
            reply_html(&bot, msg.chat.id, &text).await;
        }
        Command::History => match tutor.history(user_id, &Local) {
            Ok(entries) => {
                for entry in entries {
                    reply_html(&bot, msg.chat.id, &entry).await;
                }
            }
            Err(e) => {
                error!("Failed to read history for {user_id}: {e}");
                reply(&bot, msg.chat.id, replies::STORE_UNAVAILABLE, None).await;
            }
        },
    }

    Ok(())
}

async fn handle_private_text(bot: Bot, msg: Message, tutor: TutorState) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    let question = match replies::direct_question(text) {
        Ok(question) => question,
        Err(notice) => {
            reply(&bot, msg.chat.id, notice, None).await;
            return Ok(());
        }
    };

    reply(&bot, msg.chat.id, replies::THINKING, None).await;

    match tutor.answer(user_id, question).await {
        Ok(answer) => reply(&bot, msg.chat.id, &replies::direct_answer(&answer), None).await,
        Err(e) => {
            warn!("Completion failed for user {user_id}: {e}");
            reply(&bot, msg.chat.id, replies::FETCH_FAILED, None).await;
        }
    }

    Ok(())
}

async fn handle_group_text(bot: Bot, msg: Message, tutor: TutorState) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    if !tutor.capture_mention(msg.chat.id.0, user_id, text) {
        return Ok(());
    }
    info!("📣 Mention from {} ({}) in chat {}", user.first_name, user_id, msg.chat.id);

    let mention = router::display_mention(user.username.as_deref(), &user.first_name);
    if let Err(e) = bot
        .send_message(msg.chat.id, router::destination_prompt(&mention))
        .reply_parameters(ReplyParameters::new(msg.id))
        .reply_markup(router::destination_keyboard())
        .await
    {
        warn!("Failed to send destination prompt: {e}");
    }

    Ok(())
}

async fn handle_destination(bot: Bot, q: CallbackQuery, tutor: TutorState) -> ResponseResult<()> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {e}");
    }

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let destination: Destination = match data.parse() {
        Ok(d) => d,
        Err(e) => {
            warn!("Ignoring callback from {}: {e}", q.from.id);
            return Ok(());
        }
    };
    let Some(prompt) = q.message.as_ref() else {
        warn!("Callback from {} has no message attached", q.from.id);
        return Ok(());
    };

    let chat_id = prompt.chat().id;
    let prompt_id = prompt.id();
    let user_id = q.from.id.0 as i64;
    info!("🔀 {} ({}) chose {} in chat {}", q.from.first_name, user_id, destination, chat_id);

    match tutor.resolve(chat_id.0, user_id, destination).await {
        Resolution::NoPendingQuestion => {
            reply(&bot, chat_id, replies::NO_PENDING_QUESTION, Some(prompt_id)).await;
        }
        Resolution::Failed(_) => {
            reply(&bot, chat_id, replies::FETCH_FAILED, Some(prompt_id)).await;
        }
        Resolution::Deliver { destination: Destination::Group, text } => {
            reply(&bot, chat_id, &text, Some(prompt_id)).await;
        }
        Resolution::Deliver { destination: Destination::Dm, text } => {
            if let Err(e) = send_text(&bot, q.from.id, &text, None).await {
                warn!("Failed to DM user {user_id}: {e}");
                reply(&bot, chat_id, replies::DM_BLOCKED, Some(prompt_id)).await;
            }
        }
    }

    Ok(())
}

/// Send plain text, split to fit Telegram's length limit.
async fn send_text<R>(bot: &Bot, to: R, text: &str, reply_to: Option<MessageId>) -> ResponseResult<()>
where
    R: Into<Recipient> + Clone,
{
    for part in replies::split_message(text, MAX_MESSAGE_CHARS) {
        let mut request = bot.send_message(to.clone(), part);
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(id));
        }
        request.await?;
    }
    Ok(())
}

async fn reply(bot: &Bot, chat_id: ChatId, text: &str, reply_to: Option<MessageId>) {
    if let Err(e) = send_text(bot, chat_id, text, reply_to).await {
        warn!("Failed to send to {chat_id}: {e}");
    }
}

async fn reply_html(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).parse_mode(ParseMode::Html).await {
        warn!("Failed to send to {chat_id}: {e}");
    }
}
