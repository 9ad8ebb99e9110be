//! Integration tests for pcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Temp dir holding a backing source, a cache root and a config path
    struct Sandbox {
        temp: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let sandbox = Self {
                temp: TempDir::new().unwrap(),
            };
            std::fs::create_dir_all(sandbox.source()).unwrap();
            sandbox
        }

        fn source(&self) -> PathBuf {
            self.temp.path().join("source")
        }

        fn cache(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn write(&self, name: &str, content: &[u8]) {
            let path = self.source().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("pcache");
            cmd.env("PCACHE_CONFIG", self.temp.path().join("config.toml"))
                .env("PCACHE_CACHE_ROOT", self.cache())
                .env("PCACHE_SOURCE", self.source())
                .env("CI", "1");
            cmd
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("pcache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("persistent read cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("pcache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pcache"));
    }

    #[test]
    fn config_path_and_init() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));

        sandbox.cmd().args(["config", "init"]).assert().success();
        assert!(sandbox.temp.path().join("config.toml").exists());

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("revalidate"));
    }

    #[test]
    fn read_range_to_stdout() {
        let sandbox = Sandbox::new();
        sandbox.write("movies/movie.mkv", b"0123456789abcdefghij");

        sandbox
            .cmd()
            .args(["read", "movies/movie.mkv", "--offset", "5", "--length", "5"])
            .assert()
            .success()
            .stdout("56789");

        // Overlapping read, partly cached
        sandbox
            .cmd()
            .args(["read", "/movies/movie.mkv", "--offset", "8"])
            .assert()
            .success()
            .stdout("89abcdefghij");
    }

    #[test]
    fn read_to_output_file() {
        let sandbox = Sandbox::new();
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        sandbox.write("data.bin", &content);
        let out = sandbox.temp.path().join("out.bin");

        sandbox
            .cmd()
            .args(["read", "data.bin", "--output"])
            .arg(&out)
            .assert()
            .success();

        assert_eq!(std::fs::read(out).unwrap(), content);
    }

    #[test]
    fn cached_ranges_survive_source_loss() {
        let sandbox = Sandbox::new();
        sandbox.write("a.txt", b"hello cache");
        std::fs::write(
            sandbox.temp.path().join("config.toml"),
            "[cache]\nrevalidate = false\n",
        )
        .unwrap();

        sandbox.cmd().args(["read", "a.txt"]).assert().success();
        std::fs::remove_dir_all(sandbox.source()).unwrap();

        sandbox
            .cmd()
            .args(["read", "a.txt"])
            .assert()
            .success()
            .stdout("hello cache");
    }

    #[test]
    fn read_missing_file_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["read", "nope.bin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:").and(predicate::str::contains("not found")));
    }

    #[test]
    fn read_rejects_parent_components() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["read", "../etc/passwd"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid path"));
    }

    #[test]
    fn read_without_source_hints() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .env_remove("PCACHE_SOURCE")
            .args(["read", "a"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn warm_then_status() {
        let sandbox = Sandbox::new();
        sandbox.write("a.bin", &[7u8; 5000]);
        sandbox.write("b/c.bin", &[9u8; 3000]);

        sandbox
            .cmd()
            .args(["warm", "a.bin", "b/c.bin", "--chunk-kb", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Warmed 2 file(s)"));

        sandbox
            .cmd()
            .args(["status", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/a.bin\t5000\t5000"))
            .stdout(predicate::str::contains("/b/c.bin\t3000\t3000"));

        let output = sandbox
            .cmd()
            .args(["status", "--format", "json"])
            .output()
            .unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["coverage"], 1.0);
    }

    #[test]
    fn warm_reports_failures() {
        let sandbox = Sandbox::new();
        sandbox.write("a.bin", b"ok");

        sandbox
            .cmd()
            .args(["warm", "a.bin", "missing.bin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 2 file(s)"));
    }

    #[test]
    fn status_empty_cache() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing cached yet"));
    }

    #[test]
    fn forget_drops_one_file() {
        let sandbox = Sandbox::new();
        sandbox.write("a.bin", b"aaaa");
        sandbox.write("b.bin", b"bbbb");
        sandbox.cmd().args(["read", "a.bin"]).assert().success();
        sandbox.cmd().args(["read", "b.bin"]).assert().success();

        sandbox
            .cmd()
            .args(["forget", "a.bin"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Forgot /a.bin"));

        sandbox
            .cmd()
            .args(["status", "--format", "plain"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("/b.bin").and(predicate::str::contains("/a.bin").not()),
            );

        sandbox
            .cmd()
            .args(["forget", "a.bin"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not cached"));
    }

    #[test]
    fn clear_requires_confirmation() {
        let sandbox = Sandbox::new();
        sandbox.write("a.bin", b"x");
        sandbox.cmd().args(["read", "a.bin"]).assert().success();

        sandbox
            .cmd()
            .arg("clear")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing deleted"));
        assert!(sandbox.cache().exists());

        sandbox.cmd().args(["clear", "--yes"]).assert().success();
        assert!(!sandbox.cache().exists());
    }

    #[test]
    fn bad_config_is_reported() {
        let sandbox = Sandbox::new();
        std::fs::write(
            sandbox.temp.path().join("config.toml"),
            "[warm]\njobs = 0\n",
        )
        .unwrap();

        sandbox
            .cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

mod engine_tests {
    use pcache::backing::LocalSource;
    use pcache::cache::{CacheEngine, CacheRoot, EngineOptions, FileKey};
    use pcache::PcacheError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(dir: &std::path::Path, name: &str, content: &[u8]) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn engine(temp: &TempDir, options: EngineOptions) -> CacheEngine {
        let root = CacheRoot::open(temp.path().join("cache")).await.unwrap();
        let source = LocalSource::new(temp.path().join("source"));
        CacheEngine::new(Arc::new(root), Arc::new(source), options)
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let temp = TempDir::new().unwrap();
        let content: Vec<u8> = (0..1000u32).map(|i| (i % 199) as u8).collect();
        write(&temp.path().join("source"), "movie.mkv", &content);
        let engine = engine(&temp, EngineOptions::default()).await;
        let key = FileKey::new("movie.mkv").unwrap();

        assert_eq!(engine.serve_read(&key, 0, 100).await.unwrap(), &content[..100]);
        assert_eq!(engine.serve_read(&key, 50, 100).await.unwrap(), &content[50..150]);
        assert_eq!(engine.serve_read(&key, 0, 150).await.unwrap(), &content[..150]);

        let stats = engine.stats();
        assert_eq!(stats.backing_fetches, 2);
        assert_eq!(stats.bytes_fetched, 150);
        assert_eq!(engine.coverage(&key).unwrap().cached, 150);
    }

    #[tokio::test]
    async fn restart_serves_from_disk() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("source"), "f", &[3u8; 4096]);
        let key = FileKey::new("/f").unwrap();

        let first = engine(&temp, EngineOptions::default()).await;
        first.serve_read(&key, 1024, 2048).await.unwrap();
        first.close().await.unwrap();

        let second = engine(&temp, EngineOptions::default()).await;
        assert_eq!(second.serve_read(&key, 1024, 2048).await.unwrap(), vec![3u8; 2048]);
        assert_eq!(second.stats().backing_fetches, 0);
    }

    #[tokio::test]
    async fn modified_source_is_refetched() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source, "f", b"first version");
        let engine = engine(&temp, EngineOptions::default()).await;
        let key = FileKey::new("/f").unwrap();

        assert_eq!(engine.serve_read(&key, 0, 64).await.unwrap(), b"first version");
        write(&source, "f", b"second version!");

        assert_eq!(engine.serve_read(&key, 0, 64).await.unwrap(), b"second version!");
    }

    #[tokio::test]
    async fn deleted_source_invalidates() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source, "f", b"short-lived");
        let engine = engine(&temp, EngineOptions::default()).await;
        let key = FileKey::new("/f").unwrap();

        engine.serve_read(&key, 0, 5).await.unwrap();
        std::fs::remove_file(source.join("f")).unwrap();

        let err = engine.serve_read(&key, 0, 5).await.unwrap_err();
        assert!(matches!(err, PcacheError::NotFound(_)));
        assert!(engine.coverage(&key).is_none());
    }

    #[tokio::test]
    async fn concurrent_readers_share_fetches() {
        let temp = TempDir::new().unwrap();
        let content = vec![42u8; 64 * 1024];
        write(&temp.path().join("source"), "big", &content);
        let engine = engine(&temp, EngineOptions::default()).await;
        let key = FileKey::new("/big").unwrap();

        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let engine = engine.clone();
                let key = key.clone();
                tokio::spawn(async move { engine.serve_read(&key, i * 1024, 32 * 1024).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec![42u8; 32 * 1024]);
        }

        // Union of all requests is [0, 47 KiB)
        assert_eq!(engine.stats().bytes_fetched, 47 * 1024);
    }
}
