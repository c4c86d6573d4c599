//! Driver sentiment from news articles.
//!
//! Articles from every configured RSS/Atom feed are held in one owned
//! [`TtlCache`]; a refresh fetches all feeds concurrently and is shared by
//! every caller that arrives while it runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use vader_sentiment::SentimentIntensityAnalyzer;

use super::{SentimentProvider, SourceResult};
use crate::cache::TtlCache;
use crate::error::SourceError;
use crate::types::{DriverSentiment, ScoredArticle, SentimentDistribution};

const POSITIVE_THRESHOLD: f64 = 0.05;
const NEGATIVE_THRESHOLD: f64 = -0.05;
const ARTICLES_PER_CATEGORY: usize = 10;
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
    pub source: String,
}

impl Article {
    fn text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

#[async_trait]
pub trait ArticleFeed: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> SourceResult<Vec<Article>>;
}

/// Turns an RSS 2.0 or Atom document into articles tagged with `source`.
pub fn parse_feed(body: &[u8], source: &str) -> SourceResult<Vec<Article>> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| SourceError::Decode(format!("feed {}: {}", source, e)))?;
    Ok(feed
        .entries
        .into_iter()
        .map(|entry| {
            let description = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            Article {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                description,
                published: entry.published.or(entry.updated),
                source: source.to_string(),
            }
        })
        .collect())
}

pub struct RssFeed {
    client: reqwest::Client,
    url: String,
}

impl RssFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(BROWSER_AGENT)
                .build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ArticleFeed for RssFeed {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> SourceResult<Vec<Article>> {
        let resp = self.client.get(&self.url).send().await?.error_for_status()?;
        let body = resp.bytes().await?;
        let articles = parse_feed(&body, &self.url)?;
        if articles.is_empty() {
            tracing::warn!("no entries found in feed {}", self.url);
        }
        Ok(articles)
    }
}

/// Polarity in [-1, 1] and subjectivity in [0, 1] of one text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

pub trait TextScorer: Send + Sync {
    fn score(&self, text: &str) -> TextSentiment;
}

/// VADER compound score as polarity; the share of polar wording as subjectivity.
pub struct VaderScorer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl Default for VaderScorer {
    fn default() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }
}

impl TextScorer for VaderScorer {
    fn score(&self, text: &str) -> TextSentiment {
        let scores = self.analyzer.polarity_scores(text);
        let get = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        TextSentiment {
            polarity: get("compound").clamp(-1.0, 1.0),
            subjectivity: (get("pos") + get("neg")).clamp(0.0, 1.0),
        }
    }
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn strongest(mut articles: Vec<ScoredArticle>) -> Vec<ScoredArticle> {
    articles.sort_by(|a, b| b.sentiment.abs().total_cmp(&a.sentiment.abs()));
    articles.truncate(ARTICLES_PER_CATEGORY);
    articles
}

/// Aggregates scored articles, each paired with its subjectivity.
pub fn summarize(scored: Vec<(ScoredArticle, f64)>) -> Option<DriverSentiment> {
    if scored.is_empty() {
        return None;
    }
    let n = scored.len() as f64;
    let polarities: Vec<f64> = scored.iter().map(|(a, _)| a.sentiment).collect();
    let mean = polarities.iter().sum::<f64>() / n;
    let subjectivity = scored.iter().map(|(_, s)| s).sum::<f64>() / n;

    let (mut positive, mut neutral, mut negative) = (Vec::new(), Vec::new(), Vec::new());
    for (article, _) in scored {
        if article.sentiment > POSITIVE_THRESHOLD {
            positive.push(article);
        } else if article.sentiment < NEGATIVE_THRESHOLD {
            negative.push(article);
        } else {
            neutral.push(article);
        }
    }

    Some(DriverSentiment {
        average_sentiment: mean,
        sentiment_std: sample_std(&polarities, mean),
        average_subjectivity: subjectivity,
        distribution: SentimentDistribution {
            positive: positive.len() as f64 / n,
            neutral: neutral.len() as f64 / n,
            negative: negative.len() as f64 / n,
        },
        article_count: polarities.len(),
        positive_articles: strongest(positive),
        neutral_articles: strongest(neutral),
        negative_articles: strongest(negative),
    })
}

fn mentions(text: &str, full_name: &str) -> bool {
    let text = text.to_lowercase();
    let full = full_name.to_lowercase();
    let last = full.split_whitespace().last().unwrap_or(&full);
    text.contains(&full) || text.contains(last)
}

/// Articles of every feed, owned by one sentiment provider.
pub type ArticleCache = TtlCache<Vec<Article>>;

pub struct ArticleSentiment {
    feeds: Vec<Arc<dyn ArticleFeed>>,
    scorer: Box<dyn TextScorer>,
    articles: ArticleCache,
}

impl ArticleSentiment {
    pub fn new(feeds: Vec<Arc<dyn ArticleFeed>>, scorer: Box<dyn TextScorer>, ttl: Duration) -> Self {
        Self {
            feeds,
            scorer,
            articles: ArticleCache::new(ttl),
        }
    }

    async fn fetch_all(&self) -> SourceResult<Vec<Article>> {
        let results = join_all(self.feeds.iter().map(|f| f.fetch())).await;
        let mut articles = Vec::new();
        let mut failed = 0;
        for (feed, result) in self.feeds.iter().zip(results) {
            match result {
                Ok(mut batch) => {
                    tracing::info!("fetched {} articles from {}", batch.len(), feed.name());
                    articles.append(&mut batch);
                }
                Err(e) => {
                    tracing::warn!("feed {} failed: {}", feed.name(), e);
                    failed += 1;
                }
            }
        }
        if failed > 0 && failed == self.feeds.len() {
            return Err(SourceError::Other("every news feed failed".into()));
        }
        Ok(articles)
    }

    /// Cached articles, refreshed at most once per time-to-live.
    pub async fn articles(&self) -> SourceResult<Arc<Vec<Article>>> {
        self.articles.get_or_refresh("news articles", || self.fetch_all()).await
    }
}

#[async_trait]
impl SentimentProvider for ArticleSentiment {
    async fn driver_sentiment(&self, name: &str) -> SourceResult<Option<DriverSentiment>> {
        let articles = self.articles().await?;
        let scored = articles
            .iter()
            .filter_map(|a| {
                let text = a.text();
                if !mentions(&text, name) {
                    return None;
                }
                let s = self.scorer.score(&text);
                Some((
                    ScoredArticle {
                        title: a.title.clone(),
                        source: a.source.clone(),
                        published: a.published,
                        sentiment: s.polarity,
                    },
                    s.subjectivity,
                ))
            })
            .collect();
        Ok(summarize(scored))
    }
}
