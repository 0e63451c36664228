//! The per-submission analysis flow: four independent one-message
//! conversations, run one after another, each filtered for display.

use std::fmt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use log::debug;

use crate::client::{InvokeEvent, ProgressSink, Translator};
use crate::error::Error;
use crate::request::{InvocationParameters, Message, ResponseText};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language
{   English
  , Spanish
  , French
  , German
  , Japanese
}

impl Language
{   pub const ALL: [Language; 5] =
    [   Language::English
      , Language::Spanish
      , Language::French
      , Language::German
      , Language::Japanese
    ];
}

impl fmt::Display for Language
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   let name = match self
        {   Language::English => "English"
          , Language::Spanish => "Spanish"
          , Language::French => "French"
          , Language::German => "German"
          , Language::Japanese => "Japanese"
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Language
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   Language::ALL
          .iter()
          .copied()
          .find(|lang| lang.to_string().eq_ignore_ascii_case(s.trim()))
          .ok_or_else(|| {
            Error::Configuration(format!("unsupported language: {}", s))
          })
    }
}

/// Register the translation should aim for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CulturalContext
{   Formal
  , Casual
  , Business
  , #[serde(rename = "Youth Slang")]
    YouthSlang
  , Poetic
}

impl CulturalContext
{   pub const ALL: [CulturalContext; 5] =
    [   CulturalContext::Formal
      , CulturalContext::Casual
      , CulturalContext::Business
      , CulturalContext::YouthSlang
      , CulturalContext::Poetic
    ];
}

impl fmt::Display for CulturalContext
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   let name = match self
        {   CulturalContext::Formal => "Formal"
          , CulturalContext::Casual => "Casual"
          , CulturalContext::Business => "Business"
          , CulturalContext::YouthSlang => "Youth Slang"
          , CulturalContext::Poetic => "Poetic"
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for CulturalContext
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   let wanted: String = s
          .chars()
          .filter(|c| c.is_alphanumeric())
          .collect();
        CulturalContext::ALL
          .iter()
          .copied()
          .find(|ctx| {
            let name: String = ctx
              .to_string()
              .chars()
              .filter(|c| c.is_alphanumeric())
              .collect();
            name.eq_ignore_ascii_case(&wanted)
          })
          .ok_or_else(|| {
            Error::Configuration(format!("unsupported context: {}", s))
          })
    }
}

/// One analysis tab. `ALL` is the order calls are issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind
{   Translation
  , Sentiment
  , Grammar
  , Comms
}

impl AnalysisKind
{   pub const ALL: [AnalysisKind; 4] =
    [   AnalysisKind::Translation
      , AnalysisKind::Sentiment
      , AnalysisKind::Grammar
      , AnalysisKind::Comms
    ];
}

/// What the user submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest
{   pub text: String
  , pub source: Language
  , pub target: Language
  , pub context: CulturalContext
}

impl AnalysisRequest
{   pub fn new(
      text: impl Into<String>
    , source: Language
    , target: Language
    , context: CulturalContext
    ) -> Result<Self, Error>
    {   let text = text.into();
        if text.trim().is_empty()
        {   return Err(Error::Configuration(
              "nothing to translate".to_string()
            ));
        }
        if source == target
        {   return Err(Error::Configuration(format!(
              "source and target language are both {}", source
            )));
        }
        Ok(AnalysisRequest
        {   text
          , source
          , target
          , context
        })
    }
}

/// Prompt wording is supplied from outside.
pub trait PromptTemplates
{   fn prompt(&self, kind: AnalysisKind, request: &AnalysisRequest)
      -> String;
}

/// Short default prompts, good enough for the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPrompts;

impl PromptTemplates for BasicPrompts
{   fn prompt(&self, kind: AnalysisKind, r: &AnalysisRequest) -> String
    {   match kind
        {   AnalysisKind::Translation => format!(
              "Translate the following {} text into {} using a {} \
               register. Reply with the translation only.\n\n{}",
              r.source, r.target, r.context, r.text
            )
          , AnalysisKind::Sentiment => format!(
              "Describe the sentiment and emotional tone of this {} \
               text in a few short lines.\n\n{}",
              r.source, r.text
            )
          , AnalysisKind::Grammar => format!(
              "List the main grammar points a {} speaker should know \
               to translate this {} text correctly.\n\n{}",
              r.target, r.source, r.text
            )
          , AnalysisKind::Comms => format!(
              "Give brief advice on how to communicate this {} message \
               naturally to a {} speaker.\n\n{}",
              r.source, r.target, r.text
            )
        }
    }
}

/// Lines worth showing: no blank lines, no lone spaces, nothing
/// containing `[` (bracketed annotations the models like to add).
pub fn display_lines(text: &str) -> Vec<String>
{   text
      .split('\n')
      .filter(|line| !line.is_empty() && *line != " " && !line.contains('['))
      .map(str::to_string)
      .collect()
}

/// Outcome of one analysis tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome
{   Lines(Vec<String>)
  , Error(String)
}

impl From<&ResponseText> for AnalysisOutcome
{   fn from(response: &ResponseText) -> Self
    {   match response
        {   ResponseText::Text(text) => {
              AnalysisOutcome::Lines(display_lines(text))
            }
          , ResponseText::Failed(failure) => {
              AnalysisOutcome::Error(failure.message.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport
{   pub translation: AnalysisOutcome
  , pub sentiment: AnalysisOutcome
  , pub grammar: AnalysisOutcome
  , pub comms: AnalysisOutcome
}

impl AnalysisReport
{   pub fn get(&self, kind: AnalysisKind) -> &AnalysisOutcome
    {   match kind
        {   AnalysisKind::Translation => &self.translation
          , AnalysisKind::Sentiment => &self.sentiment
          , AnalysisKind::Grammar => &self.grammar
          , AnalysisKind::Comms => &self.comms
        }
    }
}

/// Progress of one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisEvent
{   pub kind: AnalysisKind
  , pub event: InvokeEvent
}

/// Tags invoker events with the tab they belong to.
struct Tagged<'a, S: ?Sized>
{   kind: AnalysisKind
  , inner: &'a S
}

impl<S> ProgressSink for Tagged<'_, S>
where
  S: AnalysisSink + ?Sized
{   fn emit(&self, event: InvokeEvent)
    {   self.inner.emit_analysis(AnalysisEvent
        {   kind: self.kind
          , event
        });
    }
}

/// Receives progress of all tabs.
pub trait AnalysisSink
{   fn emit_analysis(&self, event: AnalysisEvent);
}

impl AnalysisSink for mpsc::UnboundedSender<AnalysisEvent>
{   fn emit_analysis(&self, event: AnalysisEvent)
    {   let _ = self.send(event);
    }
}

impl AnalysisSink for ()
{   fn emit_analysis(&self, _event: AnalysisEvent) {}
}

/// Run all four analyses, strictly in `AnalysisKind::ALL` order.
/// A failed tab does not stop the others.
pub async fn analyze<T, S>(
  translator: &Translator
, request: &AnalysisRequest
, model_name: &str
, params: &InvocationParameters
, templates: &T
, sink: &S
) -> AnalysisReport
where
  T: PromptTemplates + ?Sized
, S: AnalysisSink + ?Sized
{   let run = move |kind: AnalysisKind| async move {
      debug!("Running {:?} analysis", kind);
      let conversation = [Message::user(templates.prompt(kind, request))];
      let tagged = Tagged { kind, inner: sink };
      let response = translator
        .respond(&conversation, model_name, params, &tagged)
        .await;
      AnalysisOutcome::from(&response)
    };

    // fields are evaluated top to bottom, one call at a time
    AnalysisReport
    {   translation: run(AnalysisKind::Translation).await
      , sentiment: run(AnalysisKind::Sentiment).await
      , grammar: run(AnalysisKind::Grammar).await
      , comms: run(AnalysisKind::Comms).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguagePair
{   pub source: Language
  , pub target: Language
  , pub cultural_context: CulturalContext
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo
{   #[serde(flatten)]
    pub params: InvocationParameters
  , pub model: String
  , pub timestamp: String
  , pub lang: LanguagePair
}

/// Record of one submission, printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary
{   pub session: SessionInfo
  , pub results: Option<AnalysisReport>
  , pub score: u8
}

pub const SCORE_RANGE: (u8, u8) = (1, 10);
pub const DEFAULT_SCORE: u8 = 5;

impl SessionSummary
{   pub fn new(
      request: &AnalysisRequest
    , model: &str
    , params: &InvocationParameters
    , results: Option<AnalysisReport>
    , score: u8
    ) -> Result<Self, Error>
    {   if score < SCORE_RANGE.0 || score > SCORE_RANGE.1
        {   return Err(Error::Configuration(format!(
              "score must be between {} and {}, got {}",
              SCORE_RANGE.0, SCORE_RANGE.1, score
            )));
        }
        let timestamp = chrono::Local::now()
          .format("%Y-%m-%d %H:%M:%S")
          .to_string();
        Ok(SessionSummary
        {   session: SessionInfo
            {   params: *params
              , model: model.to_string()
              , timestamp
              , lang: LanguagePair
                {   source: request.source
                  , target: request.target
                  , cultural_context: request.context
                }
            }
          , results
          , score
        })
    }
}
