//! Qdrant: server-side collection snapshots over the HTTP API
//!
//! Dump asks the server to create a snapshot and waits for the response,
//! fetches the file, compresses it and deletes the server copy. In network
//! mode the calls go straight from this host with reqwest; in container and
//! orchestrated modes `curl` runs next to the server and the file is copied
//! out through the backend.

use super::{gunzip_file, gzip_file, local_io_error, scratch_beside, AdapterContext, EngineAdapter};
use crate::backends::Invocation;
use crate::error::BackupError;
use crate::registry::{Engine, Mode, Target};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 6333;
const DEFAULT_SNAPSHOT_DIR: &str = "/qdrant/snapshots";
const RESTORE_FILE: &str = "stackvault-restore.snapshot";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct SnapshotDescription {
    name: String,
}

pub struct VectorAdapter;

impl VectorAdapter {
    fn base_url(&self, target: &Target) -> String {
        let scheme = if target.options.tls { "https" } else { "http" };
        let host = target.host.as_deref().unwrap_or("localhost");
        format!("{}://{}:{}", scheme, host, target.port.unwrap_or(DEFAULT_PORT))
    }

    fn snapshot_dir(&self, target: &Target) -> String {
        target
            .options
            .data_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string())
    }

    fn failure(&self, target: &Target, message: String) -> BackupError {
        BackupError::ExecutionFailed {
            target: target.id(),
            backend: target.mode,
            exit_code: None,
            stderr: message,
        }
    }

    fn parse_created(&self, target: &Target, body: &[u8]) -> Result<String, BackupError> {
        serde_json::from_slice::<ApiResponse<SnapshotDescription>>(body)
            .map(|r| r.result.name)
            .map_err(|e| self.failure(target, format!("unexpected snapshot response: {}", e)))
    }

    // Direct HTTP, network mode

    fn client(&self, ctx: &AdapterContext, target: &Target) -> Result<Client, BackupError> {
        Client::builder()
            .timeout(ctx.http_timeout)
            .danger_accept_invalid_certs(target.options.tls_insecure)
            .build()
            .map_err(|e| self.failure(target, format!("HTTP client: {}", e)))
    }

    fn send(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        request: RequestBuilder,
    ) -> Result<reqwest::blocking::Response, BackupError> {
        let request = match ctx.credential(target)? {
            Some(key) => request.header("api-key", key),
            None => request,
        };
        request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.failure(target, e.to_string()))
    }

    fn dump_http(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        collection: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        let client = self.client(ctx, target)?;
        let base = format!("{}/collections/{}/snapshots", self.base_url(target), collection);

        let created = self.send(ctx, target, client.post(&base).query(&[("wait", "true")]))?;
        let body = created
            .bytes()
            .map_err(|e| self.failure(target, e.to_string()))?;
        let name = self.parse_created(target, &body)?;
        info!("Snapshot {} created for collection {}", name, collection);

        let snapshot_url = format!("{}/{}", base, name);
        let mut response = self.send(ctx, target, client.get(&snapshot_url))?;
        let file = File::create(dest).map_err(|e| local_io_error(target, "create artifact", e))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        response
            .copy_to(&mut encoder)
            .map_err(|e| self.failure(target, format!("download {}: {}", name, e)))?;
        encoder
            .finish()
            .and_then(|f| f.sync_all())
            .map_err(|e| local_io_error(target, "write artifact", e))?;

        if let Err(e) = self.send(ctx, target, client.delete(&snapshot_url)) {
            warn!("Could not delete server snapshot {}: {}", name, e);
        }
        Ok(())
    }

    fn restore_http(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        collection: &str,
        snapshot: &Path,
    ) -> Result<(), BackupError> {
        let client = self.client(ctx, target)?;
        let url = format!(
            "{}/collections/{}/snapshots/upload",
            self.base_url(target),
            collection
        );
        let form = multipart::Form::new()
            .file("snapshot", snapshot)
            .map_err(|e| local_io_error(target, "read snapshot", e))?;
        self.send(
            ctx,
            target,
            client
                .post(&url)
                .query(&[("priority", "snapshot"), ("wait", "true")])
                .multipart(form),
        )?;
        Ok(())
    }

    // curl next to the server, container and orchestrated modes

    fn curl(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        method: &str,
        url: &str,
        json_body: Option<String>,
    ) -> Result<Vec<u8>, BackupError> {
        let mut argv: Vec<String> = ["curl", "-sS", "-f", "-X", method, url]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if target.options.tls_insecure {
            argv.push("-k".to_string());
        }
        let key = ctx.credential(target)?;
        if let Some(ref key) = key {
            argv.push("-H".to_string());
            argv.push(format!("api-key: {}", key));
        }
        if let Some(body) = json_body {
            argv.push("-H".to_string());
            argv.push("Content-Type: application/json".to_string());
            argv.push("-d".to_string());
            argv.push(body);
        }

        let mut invocation = Invocation::new(argv);
        if let Some(key) = key {
            invocation = invocation.secret(key);
        }
        ctx.backend.exec(invocation)
    }

    fn dump_remote(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        collection: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        let base = format!("{}/collections/{}/snapshots", self.base_url(target), collection);
        let body = self.curl(ctx, target, "POST", &format!("{}?wait=true", base), None)?;
        let name = self.parse_created(target, &body)?;
        info!("Snapshot {} created for collection {}", name, collection);

        let scratch = scratch_beside(target, dest)?;
        let local = scratch.path().join(&name);
        ctx.backend.copy_out(
            &format!("{}/{}/{}", self.snapshot_dir(target), collection, name),
            &local,
        )?;
        gzip_file(&local, dest).map_err(|e| local_io_error(target, "compress snapshot", e))?;

        if let Err(e) = self.curl(ctx, target, "DELETE", &format!("{}/{}", base, name), None) {
            warn!("Could not delete server snapshot {}: {}", name, e);
        }
        Ok(())
    }

    fn restore_remote(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        collection: &str,
        snapshot: &Path,
    ) -> Result<(), BackupError> {
        let remote = format!("{}/{}/{}", self.snapshot_dir(target), collection, RESTORE_FILE);
        ctx.backend.copy_in(snapshot, &remote)?;

        let body = serde_json::json!({
            "location": format!("file://{}", remote),
            "priority": "snapshot",
        });
        self.curl(
            ctx,
            target,
            "PUT",
            &format!(
                "{}/collections/{}/snapshots/recover?wait=true",
                self.base_url(target),
                collection
            ),
            Some(body.to_string()),
        )?;
        Ok(())
    }
}

impl EngineAdapter for VectorAdapter {
    fn engine(&self) -> Engine {
        Engine::Vector
    }

    fn client_tools(&self, target: &Target) -> Vec<&'static str> {
        match target.mode {
            Mode::Network => Vec::new(),
            _ => vec!["curl"],
        }
    }

    fn artifact_name(&self, _target: &Target, unit: &str) -> String {
        format!("{}.snapshot.gz", unit)
    }

    fn check_mode(&self, target: &Target) -> Result<(), BackupError> {
        if target.mode == Mode::Path {
            return Err(BackupError::unsupported(
                target.engine,
                target.mode,
                "snapshots are only created through the HTTP API",
            ));
        }
        Ok(())
    }

    fn dump(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        dest: &Path,
    ) -> Result<(), BackupError> {
        self.check_mode(target)?;
        info!("Snapshotting Qdrant collection {} on {}", unit, target.id());
        match target.mode {
            Mode::Network => self.dump_http(ctx, target, unit, dest),
            _ => self.dump_remote(ctx, target, unit, dest),
        }
    }

    fn restore(
        &self,
        ctx: &AdapterContext,
        target: &Target,
        unit: &str,
        artifact: &Path,
    ) -> Result<(), BackupError> {
        self.check_restore(target)?;
        info!("Recovering Qdrant collection {} on {}", unit, target.id());

        let scratch = scratch_beside(target, artifact)?;
        let snapshot = scratch.path().join(format!("{}.snapshot", unit));
        gunzip_file(artifact, &snapshot).map_err(|e| local_io_error(target, "decompress snapshot", e))?;

        match target.mode {
            Mode::Network => self.restore_http(ctx, target, unit, &snapshot),
            _ => self.restore_remote(ctx, target, unit, &snapshot),
        }
    }
}
