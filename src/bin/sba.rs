use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use sba_generator::clients::{ClientType, FlexibleClient, OpenAIClient, OpenAIConfig, OpenAIModel};
use sba_generator::config::{GeneratorConfig, KeyFromEnv};
use sba_generator::core::{GenerationRequest, LowLevelClient, QuestionGenerator};
use sba_generator::error::{GenerateError, SessionError};
use sba_generator::guideline::load_guideline;
use sba_generator::interceptors::FileInterceptor;
use sba_generator::segment::{AnswerLetter, DelimiterStrategy, Segmenter};
use sba_generator::session::{Outcome, RevealedQuestion, SessionState, SubmitPolicy};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClientArg {
    Openai,
    Mock,
}

impl From<ClientArg> for ClientType {
    fn from(arg: ClientArg) -> Self {
        match arg {
            ClientArg::Openai => ClientType::OpenAI,
            ClientArg::Mock => ClientType::Mock,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Auto,
    Sentinel,
    BlankLine,
    AnswerMarker,
}

impl From<StrategyArg> for DelimiterStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => DelimiterStrategy::Auto,
            StrategyArg::Sentinel => DelimiterStrategy::Sentinel,
            StrategyArg::BlankLine => DelimiterStrategy::BlankLine,
            StrategyArg::AnswerMarker => DelimiterStrategy::AnswerMarker,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Single-best-answer question generator for clinical guidelines", long_about = None)]
#[command(after_help = "ENVIRONMENT VARIABLES:
    OPENAI_API_KEY           API key for the OpenAI client
    SBA_TIMEOUT_SECS         Model call timeout in seconds [default: 120]
    SBA_MAX_GUIDELINE_CHARS  Guideline characters included in the prompt [default: 2000]
    SBA_MAX_QUESTIONS        Largest allowed question count [default: 5]
    RUST_LOG                 Log filter, e.g. sba_generator=debug [default: warn]

EXAMPLES:
    sba generate --topic 'Acute stroke' --guideline nice-ng128.pdf -n 3
    sba generate --topic Sepsis --guideline sepsis.txt --client mock
    sba segment saved_response.txt --json")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate questions from a guideline and answer them interactively
    Generate(GenerateArgs),
    /// Structure a saved model response into questions
    Segment(SegmentArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Curriculum topic the questions should focus on
    #[arg(short, long)]
    topic: String,

    /// Guideline document (PDF or plain text)
    #[arg(short, long)]
    guideline: PathBuf,

    /// Number of questions to request
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Model client: openai, mock [default: openai if OPENAI_API_KEY is set]
    #[arg(short, long, value_enum)]
    client: Option<ClientArg>,

    /// OpenAI model id [default: gpt-4-turbo]
    #[arg(long)]
    model: Option<String>,

    /// Model call timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Directory to save prompt/response transcripts in
    #[arg(long)]
    transcripts: Option<PathBuf>,

    /// Allow submitting with unanswered questions
    #[arg(long)]
    allow_partial: bool,

    /// Print generated records (answers included) as JSON instead of quizzing
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SegmentArgs {
    /// File holding a raw model response, or - for stdin
    input: PathBuf,

    #[arg(long, value_enum, default_value = "auto")]
    strategy: StrategyArg,

    /// Sentinel token separating questions
    #[arg(long)]
    sentinel: Option<String>,

    /// Print the segmentation as JSON
    #[arg(long)]
    json: bool,
}

/// One keystroke or line of answer input
enum AnswerInput {
    Letter(char),
    Skip,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args).await,
        Command::Segment(args) => run_segment(args),
    }
}

fn build_client(args: &GenerateArgs) -> Result<Box<dyn LowLevelClient>> {
    let client_type = args.client.map(ClientType::from).unwrap_or_default();
    let client: Box<dyn LowLevelClient> = match (client_type, &args.model) {
        (ClientType::OpenAI, Some(model)) => {
            let api_key = OpenAIClient::require_key()?;
            Box::new(OpenAIClient::new(OpenAIConfig {
                api_key,
                model: OpenAIModel::from_id(model),
                ..OpenAIConfig::default()
            }))
        }
        (client_type, _) => client_type.build()?,
    };
    eprintln!("Using {} client", client_type);
    Ok(client)
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let mut config = GeneratorConfig::from_env();
    if let Some(secs) = args.timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    let guideline = load_guideline(&args.guideline)
        .with_context(|| format!("Could not load guideline {}", args.guideline.display()))?;

    let mut generator = QuestionGenerator::new(FlexibleClient::new(build_client(&args)?), config);
    if let Some(dir) = &args.transcripts {
        generator = generator.with_interceptor(Arc::new(FileInterceptor::new(dir.clone())));
    }

    let request = GenerationRequest::new(args.topic.clone(), guideline, args.count);
    eprintln!("Generating {} question(s) on '{}'...", args.count, args.topic.trim());

    if args.json {
        let records = generator.generate(&request).await.map_err(no_questions_hint)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let policy = if args.allow_partial { SubmitPolicy::AllowPartial } else { SubmitPolicy::RequireAll };
    let mut session = SessionState::with_policy(policy);
    generator
        .generate_into(&mut session, &request)
        .await
        .map_err(no_questions_hint)?;

    run_quiz(&mut session)
}

fn no_questions_hint(e: GenerateError) -> anyhow::Error {
    match e {
        GenerateError::EmptyResponse => anyhow::anyhow!("No questions generated. Please try again."),
        other => other.into(),
    }
}

fn run_quiz(session: &mut SessionState) -> Result<()> {
    println!("\nGenerated Questions:");
    for view in session.current_view() {
        println!("\nQuestion {}\n\n{}\n", view.ordinal, view.visible_text);
        match prompt_answer(view.ordinal)? {
            AnswerInput::Letter(c) => session.select_answer(view.ordinal, c)?,
            AnswerInput::Skip => {}
            AnswerInput::Quit => bail!("Quit before submitting"),
        }
    }

    let revealed = loop {
        match session.submit() {
            Ok(revealed) => break revealed,
            Err(SessionError::IncompleteSelections { missing }) => {
                println!("\nPlease answer every question before submitting (missing: {:?}).", missing);
                for ordinal in missing {
                    match prompt_answer(ordinal)? {
                        AnswerInput::Letter(c) => session.select_answer(ordinal, c)?,
                        AnswerInput::Skip => {}
                        AnswerInput::Quit => bail!("Quit before submitting"),
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    };

    println!("\nAnswers and Explanations:");
    for question in &revealed {
        print_revealed(question);
    }
    if let Some(card) = session.scorecard() {
        match card.percent() {
            Some(pct) => println!("\nScore: {}/{} ({:.0}%)", card.correct, card.graded(), pct),
            None => println!("\nNo gradable questions in this batch."),
        }
    }
    Ok(())
}

fn print_revealed(q: &RevealedQuestion) {
    println!("\nQuestion {}\n\n{}\n", q.ordinal, q.visible_text);
    let selection = q.selection.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
    println!("Your answer: {}", selection);
    match (q.outcome, q.correct_answer) {
        (Outcome::Ungraded, _) | (_, None) => {
            println!("The correct answer could not be read from the model output.");
            return;
        }
        (Outcome::Correct, Some(c)) => println!("Correct answer: {} (correct)", c),
        (_, Some(c)) => println!("Correct answer: {}", c),
    }
    if let Some(explanation) = &q.explanation {
        println!("Explanation: {}", explanation);
    }
    if let Some(quote) = &q.source_quote {
        println!("Guideline: {}", quote);
    }
}

fn prompt_answer(ordinal: usize) -> Result<AnswerInput> {
    print!("Your answer to Question {} (A-E, Enter to skip): ", ordinal);
    io::stdout().flush()?;

    let input = match read_single_key() {
        Ok(input) => input,
        Err(_) => read_line_answer()?,
    };
    match &input {
        AnswerInput::Letter(c) => println!("{}", c),
        AnswerInput::Skip => println!("(skipped)"),
        AnswerInput::Quit => println!(),
    }
    Ok(input)
}

/// Single keystroke via raw mode; errors when stdin is not a terminal
fn read_single_key() -> io::Result<AnswerInput> {
    terminal::enable_raw_mode()?;
    let result = next_answer_key();
    terminal::disable_raw_mode()?;
    result
}

fn next_answer_key() -> io::Result<AnswerInput> {
    loop {
        if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
            if kind != KeyEventKind::Press {
                continue;
            }
            match code {
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(AnswerInput::Quit),
                KeyCode::Esc => return Ok(AnswerInput::Quit),
                KeyCode::Enter => return Ok(AnswerInput::Skip),
                KeyCode::Char(c) => {
                    if let Some(letter) = AnswerLetter::from_char(c.to_ascii_uppercase()) {
                        return Ok(AnswerInput::Letter(letter.as_char()));
                    }
                }
                _ => {}
            }
        }
    }
}

fn read_line_answer() -> Result<AnswerInput> {
    loop {
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(AnswerInput::Quit);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(AnswerInput::Skip);
        }
        if trimmed.eq_ignore_ascii_case("q") {
            return Ok(AnswerInput::Quit);
        }
        match trimmed.to_ascii_uppercase().parse::<AnswerLetter>() {
            Ok(letter) => return Ok(AnswerInput::Letter(letter.as_char())),
            Err(e) => {
                print!("{} Try again: ", e);
                io::stdout().flush()?;
            }
        }
    }
}

fn run_segment(args: SegmentArgs) -> Result<()> {
    let raw = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("Could not read {}", args.input.display()))?
    };

    let mut builder = Segmenter::builder().strategy(args.strategy.into());
    if let Some(sentinel) = args.sentinel {
        builder = builder.sentinel(sentinel);
    }
    let report = builder.build().segment_report(&raw);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} question(s) via {} split, {} block(s) discarded, {} malformed",
        report.records.len(),
        report.strategy,
        report.discarded,
        report.malformed_count()
    );
    for record in &report.records {
        println!("\n--- Question {} ---\n{}", record.ordinal, record.visible_text);
        match record.correct_answer {
            Some(letter) => println!("Correct answer: {}", letter),
            None => println!("Correct answer: (unparseable)"),
        }
        if let Some(explanation) = &record.explanation {
            println!("Explanation: {}", explanation);
        }
        if let Some(quote) = &record.source_quote {
            println!("Quote: {}", quote);
        }
    }
    Ok(())
}
