//! In-process driver serving one index profile.
//!
//! The live index sits behind a read/write lock as an `Arc`, so searches clone
//! the pointer and run on the blocking pool without holding the lock. An
//! import builds the replacement on the blocking pool, persists it, and only
//! then swaps it in; readers see either the old index or the new one, never a
//! partial build.
//!
//! Dropping an `import` future cancels its build. Once the build has finished,
//! saving and swapping run together on the blocking task, so the file on disk
//! and the served index never disagree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use log::{info, warn};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::analysis::AnalyzerConfig;
use crate::data::DocumentSource;
use crate::driver::{Driver, DriverConfig, DriverInfo, DriverStats, SearchResult};
use crate::error::{FtsError, Result};
use crate::index::{IndexSettings, Profile, SearchIndex, load_index, save_index};
use crate::indexer::{IndexerConfig, ParallelIndexer, ProgressFn};
use crate::scoring::Bm25Params;
use crate::util::cancel::CancelToken;

const INDEX_FILE: &str = "index.bin";

const OPTIONS: [&str; 8] = [
    "k1",
    "b",
    "workers",
    "batch_size",
    "persist",
    "stem",
    "strip_accents",
    "max_token_len",
];

#[derive(Debug)]
pub struct LocalDriver {
    profile: Profile,
    settings: IndexSettings,
    indexer: IndexerConfig,
    path: Option<PathBuf>,
    index: Arc<RwLock<Option<Arc<dyn SearchIndex>>>>,
    import_lock: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl LocalDriver {
    /// Registry name of the driver serving `profile`.
    pub fn driver_name(profile: Profile) -> &'static str {
        match profile {
            Profile::Speed => "fts_speed",
            Profile::Balanced => "fts_balanced",
            Profile::Compact => "fts_compact",
        }
    }

    /// Open a driver, loading the persisted index when one exists.
    pub fn open(profile: Profile, config: DriverConfig) -> Result<Self> {
        let name = Self::driver_name(profile);
        for key in config.options.keys() {
            if !OPTIONS.contains(&key.as_str()) {
                warn!("{name}: ignoring unknown option '{key}'");
            }
        }

        let defaults = Bm25Params::default();
        let bm25 = Bm25Params {
            k1: config.option_f32("k1")?.unwrap_or(defaults.k1),
            b: config.option_f32("b")?.unwrap_or(defaults.b),
        };
        bm25.validate()?;

        let analyzer_defaults = AnalyzerConfig::for_language(config.language());
        let analyzer = AnalyzerConfig {
            stem: config.option_bool("stem")?.unwrap_or(analyzer_defaults.stem),
            strip_accents: config
                .option_bool("strip_accents")?
                .unwrap_or(analyzer_defaults.strip_accents),
            max_token_len: config
                .option_usize("max_token_len")?
                .unwrap_or(analyzer_defaults.max_token_len),
            ..analyzer_defaults
        };

        let indexer_defaults = IndexerConfig::default();
        let indexer = IndexerConfig {
            workers: config.option_usize("workers")?.unwrap_or(indexer_defaults.workers),
            batch_size: config
                .option_usize("batch_size")?
                .unwrap_or(indexer_defaults.batch_size),
            ..indexer_defaults
        };
        indexer.validate()?;

        let persist = config.option_bool("persist")?.unwrap_or(true);
        let path = match &config.data_dir {
            Some(dir) if persist => Some(
                dir.join(format!("{}.{name}", config.language()))
                    .join(INDEX_FILE),
            ),
            _ => None,
        };

        let existing = match &path {
            Some(path) if path.exists() => {
                let index = load_index(path)?;
                if index.profile() != profile {
                    return Err(FtsError::corrupt(format!(
                        "{} holds a {} index, expected {profile}",
                        path.display(),
                        index.profile()
                    )));
                }
                info!("{name}: loaded {} documents from {}", index.count(), path.display());
                Some(Arc::from(index))
            }
            _ => None,
        };

        Ok(LocalDriver {
            profile,
            settings: IndexSettings { bm25, analyzer },
            indexer,
            path,
            index: Arc::new(RwLock::new(existing)),
            import_lock: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Where the index is persisted, if anywhere.
    pub fn index_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The index currently served.
    pub fn index(&self) -> Option<Arc<dyn SearchIndex>> {
        self.index.read().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FtsError::Closed(self.name().to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &str {
        Self::driver_name(self.profile)
    }

    fn info(&self) -> DriverInfo {
        let (description, features): (&str, &[&str]) = match self.profile {
            Profile::Speed => (
                "Uncompressed posting arrays with a hashed term table",
                &["bm25", "phrase", "simd", "hash-dictionary"],
            ),
            Profile::Balanced => (
                "VByte posting blocks traversed with Block-Max WAND",
                &["bm25", "phrase", "block-max-wand", "vbyte", "fst"],
            ),
            Profile::Compact => (
                "Elias-Fano doc ids, StreamVByte frequencies, LZ4 documents",
                &["bm25", "phrase", "simd", "elias-fano", "stream-vbyte", "fst", "lz4"],
            ),
        };
        DriverInfo {
            name: self.name().to_string(),
            description: description.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            external: false,
        }
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let name = self.name();
        let Some(index) = self.index() else {
            return Ok(SearchResult {
                method: name.to_string(),
                ..Default::default()
            });
        };

        let query = query.to_string();
        let (documents, total) = tokio::task::spawn_blocking(move || -> Result<_> {
            let hits = index.search(&query, limit, offset)?;
            let documents = hits
                .hits
                .iter()
                .map(|hit| {
                    let mut doc = index.document(hit.doc)?;
                    doc.score = hit.score as f64;
                    Ok(doc)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((documents, hits.total))
        })
        .await
        .map_err(|e| FtsError::other(format!("search task failed: {e}")))??;

        Ok(SearchResult {
            documents,
            duration: started.elapsed(),
            method: name.to_string(),
            total,
        })
    }

    async fn import(
        &self,
        source: DocumentSource,
        progress: Option<ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.ensure_open()?;
        // Held by the blocking task, so a build orphaned by a dropped future
        // still finishes before the next import starts.
        let permit = self.import_lock.clone().lock_owned().await;
        let started = Instant::now();

        let name = Self::driver_name(self.profile);
        let profile = self.profile;
        let settings = self.settings.clone();
        let indexer_config = self.indexer.clone();
        let path = self.path.clone();
        let slot = self.index.clone();
        let closed = self.closed.clone();
        let cancel = cancel.child();
        let abort = cancel.clone().drop_guard();

        let count = tokio::task::spawn_blocking(move || -> Result<u64> {
            let _permit = permit;
            let indexer = ParallelIndexer::new(indexer_config)?;
            let index = indexer.build(profile, source, &settings, progress.as_ref(), &cancel)?;
            cancel.check()?;
            if closed.load(Ordering::Acquire) {
                return Err(FtsError::Closed(name.to_string()));
            }
            if let Some(path) = &path {
                save_index(index.as_ref(), path)?;
            }

            let count = index.count();
            let mut slot = slot.write();
            if !closed.load(Ordering::Acquire) {
                *slot = Some(Arc::from(index));
            }
            Ok(count)
        })
        .await
        .map_err(|e| FtsError::other(format!("import task failed: {e}")))??;
        abort.disarm();

        info!("{name}: imported {count} documents in {:?}", started.elapsed());
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.index().map_or(0, |index| index.count()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.index.write().take();
        Ok(())
    }

    async fn stats(&self) -> Option<DriverStats> {
        let index = self.index()?;
        let disk_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());
        Some(DriverStats {
            documents: index.count(),
            index: Some(index.stats()),
            disk_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{self, Document};

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", "the cat sat"),
            Document::new("b", "the dog ran"),
            Document::new("c", "cats and dogs"),
        ]
    }

    #[tokio::test]
    async fn test_memory_only_driver() {
        for profile in Profile::ALL {
            let driver = LocalDriver::open(profile, DriverConfig::new("x")).unwrap();
            assert!(driver.index_path().is_none());
            assert_eq!(driver.count().await.unwrap(), 0);
            let empty = driver.search("cat", 10, 0).await.unwrap();
            assert!(empty.documents.is_empty());
            assert_eq!(empty.total, 0);

            driver
                .import(data::from_documents(docs()), None, &CancelToken::new())
                .await
                .unwrap();
            assert_eq!(driver.count().await.unwrap(), 3);

            let result = driver.search("cat", 10, 0).await.unwrap();
            assert_eq!(result.method, driver.name());
            let ids: Vec<&str> = result.documents.iter().map(|d| d.id.as_str()).collect();
            assert_eq!(ids, vec!["a", "c"]);
            assert!(result.documents[0].score >= result.documents[1].score);
        }
    }

    #[tokio::test]
    async fn test_options() {
        let config = DriverConfig::new("fts_speed")
            .with_language("de")
            .with_option("k1", "2.0")
            .with_option("stem", "false")
            .with_option("workers", "2");
        let driver = LocalDriver::open(Profile::Speed, config).unwrap();
        assert_eq!(driver.settings.bm25.k1, 2.0);
        assert!(!driver.settings.analyzer.stem);
        assert_eq!(driver.settings.analyzer.language, "de");
        assert_eq!(driver.indexer.workers, 2);

        let bad = DriverConfig::new("fts_speed").with_option("b", "3");
        assert!(matches!(
            LocalDriver::open(Profile::Speed, bad),
            Err(FtsError::InvalidConfig(_))
        ));
        let bad = DriverConfig::new("fts_speed").with_option("workers", "0");
        assert!(LocalDriver::open(Profile::Speed, bad).is_err());
    }

    #[tokio::test]
    async fn test_index_path_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DriverConfig::new("fts_compact")
            .with_data_dir(dir.path())
            .with_language("vie_Latn");
        let driver = LocalDriver::open(Profile::Compact, config).unwrap();
        assert_eq!(
            driver.index_path().unwrap(),
            dir.path().join("vie_Latn.fts_compact").join("index.bin")
        );

        let config = DriverConfig::new("fts_compact")
            .with_data_dir(dir.path())
            .with_option("persist", "false");
        assert!(LocalDriver::open(Profile::Compact, config).unwrap().index_path().is_none());
    }

    #[tokio::test]
    async fn test_closed_driver() {
        let driver = LocalDriver::open(Profile::Balanced, DriverConfig::new("x")).unwrap();
        driver
            .import(data::from_documents(docs()), None, &CancelToken::new())
            .await
            .unwrap();
        driver.close().await.unwrap();

        assert!(matches!(driver.search("cat", 10, 0).await, Err(FtsError::Closed(_))));
        assert!(matches!(driver.count().await, Err(FtsError::Closed(_))));
        let again = driver
            .import(data::from_documents(docs()), None, &CancelToken::new())
            .await;
        assert!(matches!(again, Err(FtsError::Closed(_))));
        assert!(driver.stats().await.is_none());
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DriverConfig::new("fts_speed").with_data_dir(dir.path());
        let driver = LocalDriver::open(Profile::Speed, config).unwrap();
        assert!(driver.stats().await.is_none());

        driver
            .import(data::from_documents(docs()), None, &CancelToken::new())
            .await
            .unwrap();
        let stats = driver.stats().await.unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.index.unwrap().profile, Profile::Speed);
        assert!(stats.disk_bytes.unwrap() > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_searches() {
        let driver = LocalDriver::open(Profile::Compact, DriverConfig::new("x")).unwrap();
        driver
            .import(data::from_documents(docs()), None, &CancelToken::new())
            .await
            .unwrap();

        let expected = driver.search("cat", 10, 0).await.unwrap();
        let pages = futures::future::join_all((0..32).map(|_| driver.search("cat", 10, 0))).await;
        for page in pages {
            let page = page.unwrap();
            assert_eq!(page.documents, expected.documents);
            assert_eq!(page.total, expected.total);
        }
    }
}
