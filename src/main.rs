use std::io::Write;
use clap::Parser;
use log::{debug, warn};
use tokio::sync::mpsc;

use lexbridge::analysis::{
  self, AnalysisEvent, AnalysisOutcome, AnalysisKind, AnalysisRequest,
  BasicPrompts, CulturalContext, Language, SessionSummary, DEFAULT_SCORE
};
use lexbridge::router::MODEL_CATALOG;
use lexbridge::{DecodingMethod, InvocationParameters, InvokeEvent, Settings, Translator};

const DEFAULT_MODEL: &str = "meta-llama/llama-3-3-70b-instruct";

/// Translate a text and analyse it with a watsonx-hosted model.
#[derive(Debug, Parser)]
#[command(name = "lexbridge", version)]
struct Cli
{   /// Text to translate
    text: String

  , /// Model id (IBM_MODEL_ID overrides it)
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String

  , #[arg(long, default_value = "English")]
    from: Language

  , #[arg(long, default_value = "Spanish")]
    to: Language

  , #[arg(long, default_value = "Formal")]
    context: CulturalContext

  , /// greedy or sampling
    #[arg(long, default_value = "greedy")]
    decoding: DecodingMethod

  , #[arg(long, default_value_t = 200)]
    max_tokens: u32

  , #[arg(long, default_value_t = 0.5)]
    temperature: f32

  , #[arg(long, default_value_t = 50)]
    top_k: u32

  , #[arg(long, default_value_t = 0.5)]
    top_p: f32

  , /// Print the answer as it arrives (if the model supports it)
    #[arg(long)]
    stream: bool

  , /// Session score, 1-10
    #[arg(long, default_value_t = DEFAULT_SCORE)]
    score: u8

  , /// List the model catalog and exit
    #[arg(long)]
    list_models: bool
}

#[tokio::main]
async fn main()
{   if let Err(e) = dotenvy::dotenv()
    {   // A missing .env is normal
        if !e.not_found()
        {   eprintln!("warning: could not read .env: {}", e);
        }
    }
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await
    {   eprintln!("{}", e.diagnostic());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), lexbridge::Error>
{   if cli.list_models
    {   for model in MODEL_CATALOG
        {   println!("{}", model);
        }
        return Ok(());
    }

    let mut settings = Settings::from_env();
    if cli.stream
    {   settings = settings.with_stream(true);
    }
    if let Some(model) = &settings.model_override
    {   warn!(
          "IBM_MODEL_ID={} is set and overrides --model {}",
          model, cli.model
        );
    }
    debug!("Settings: {:?}", settings);

    let params = InvocationParameters
    {   decoding_method: cli.decoding
      , max_tokens: cli.max_tokens
      , temperature: cli.temperature
      , top_k: cli.top_k
      , top_p: cli.top_p
    };
    params.validate()?;

    let request
      = AnalysisRequest::new(cli.text, cli.from, cli.to, cli.context)?;
    let translator = Translator::new(settings)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<AnalysisEvent>();
    let printer = tokio::spawn(async move {
      let mut stdout = std::io::stdout();
      while let Some(AnalysisEvent { kind, event }) = rx.recv().await
      {   match event
          {   InvokeEvent::Processing => {
                println!("\n== {:?} ==", kind);
              }
            , InvokeEvent::Chunk(fragment) => {
                print!("{}", fragment);
                let _ = stdout.flush();
              }
            , InvokeEvent::Completed(_) => println!()
            , InvokeEvent::Failed(failure) => {
                println!("{}", failure.message);
              }
          }
      }
    });

    let report = analysis::analyze(
      &translator,
      &request,
      &cli.model,
      &params,
      &BasicPrompts,
      &tx,
    ).await;
    drop(tx);
    let _ = printer.await;

    for kind in AnalysisKind::ALL
    {   println!("\n-- {:?} --", kind);
        match report.get(kind)
        {   AnalysisOutcome::Lines(lines) => {
              for line in lines
              {   println!("{}", line);
              }
            }
          , AnalysisOutcome::Error(message) => println!("{}", message)
        }
    }

    let model = translator.settings().effective_model(&cli.model);
    let summary = SessionSummary::new(
      &request, model, &params, Some(report), cli.score
    )?;
    let json = serde_json::to_string_pretty(&summary).map_err(|e| {
      lexbridge::Error::Configuration(e.to_string())
    })?;
    println!("\n{}", json);
    Ok(())
}
