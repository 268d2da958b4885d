//! イメージ事前チェック
//!
//! デプロイ前にローカルのコンテナイメージを検査し、必要に応じて
//! レジストリへプッシュします。イメージのビルドは対象外です
//! （Docker CLI側の責務）。

use bollard::auth::DockerCredentials;
use bollard::image::PushImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use thiserror::Error;
use tracing::{debug, info};

/// Docker連携のエラー型
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Docker API error: {0}")]
    Api(String),

    #[error("Image not found locally: {0}")]
    ImageNotFound(String),

    #[error("Push failed for {reference}: {detail}")]
    PushFailed { reference: String, detail: String },
}

pub type Result<T> = std::result::Result<T, PreflightError>;

/// ローカルイメージの概要
#[derive(Debug, Clone)]
pub struct LocalImage {
    pub id: String,
    pub reference: String,
    pub size_bytes: i64,
}

/// デプロイ前のイメージ検査とプッシュ
pub struct ImagePreflight {
    docker: Docker,
}

impl ImagePreflight {
    /// Unixソケット経由でDockerデーモンに接続
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_socket_defaults()
            .map_err(|e| PreflightError::Api(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    /// デーモンが応答するかを確認
    pub async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// 参照されたイメージがローカルに存在するかを検査
    pub async fn verify_local(&self, reference: &str) -> Result<LocalImage> {
        let inspect = self.docker.inspect_image(reference).await.map_err(|e| {
            PreflightError::ImageNotFound(format!("{}: {}", reference, e))
        })?;

        let image = LocalImage {
            id: inspect.id.unwrap_or_default(),
            reference: reference.to_string(),
            size_bytes: inspect.size.unwrap_or_default(),
        };

        info!(
            "Image {} present locally ({} bytes)",
            image.reference, image.size_bytes
        );
        Ok(image)
    }

    /// イメージをレジストリへプッシュ
    ///
    /// 認証情報は DOCKER_USERNAME / DOCKER_PASSWORD から取得します。
    pub async fn push(&self, reference: &str) -> Result<()> {
        let (name, tag) = split_reference(reference);

        info!("Pushing image {}:{}", name, tag);

        let options = Some(PushImageOptions { tag: tag.clone() });
        let mut stream = self
            .docker
            .push_image(&name, options, credentials_from_env(&name));

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Push status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(PreflightError::PushFailed {
                        reference: reference.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        info!("Successfully pushed image {}:{}", name, tag);
        Ok(())
    }
}

/// `repo/name:tag` を名前とタグに分割（タグ省略時は latest）
fn split_reference(reference: &str) -> (String, String) {
    match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name.to_string(), tag.to_string()),
        _ => (reference.to_string(), "latest".to_string()),
    }
}

/// 環境変数からレジストリ認証情報を組み立て
fn credentials_from_env(name: &str) -> Option<DockerCredentials> {
    let username = std::env::var("DOCKER_USERNAME").ok()?;
    let password = std::env::var("DOCKER_PASSWORD").ok()?;

    // レジストリホストはイメージ名の先頭セグメントから推定
    let serveraddress = name
        .split('/')
        .next()
        .filter(|host| host.contains('.') || host.contains(':'))
        .map(str::to_string);

    Some(DockerCredentials {
        username: Some(username),
        password: Some(password),
        serveraddress,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(
            split_reference("chatbot:v1"),
            ("chatbot".to_string(), "v1".to_string())
        );
        assert_eq!(
            split_reference("registry.example.com:5000/team/chatbot:v1"),
            (
                "registry.example.com:5000/team/chatbot".to_string(),
                "v1".to_string()
            )
        );
        assert_eq!(
            split_reference("registry.example.com:5000/team/chatbot"),
            (
                "registry.example.com:5000/team/chatbot".to_string(),
                "latest".to_string()
            )
        );
    }

    #[tokio::test]
    #[ignore] // Docker環境が必要
    async fn test_docker_connection() {
        let preflight = ImagePreflight::new();
        assert!(preflight.is_ok());
        assert!(preflight.unwrap().ping().await);
    }
}
