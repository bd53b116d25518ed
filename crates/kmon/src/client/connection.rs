use kube::{
    config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
    Client, Config,
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
    ContextNotFound(String),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error(transparent)]
    Infer(#[from] kube::config::InferConfigError),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Build a client for the given kubeconfig context, or for whatever
/// [`Config::infer`] resolves (kubeconfig, then in-cluster) when none is given.
#[instrument]
pub async fn connect(context: Option<&str>) -> Result<Client, ConnectionError> {
    let config = match context {
        Some(context) => {
            let kubeconfig = Kubeconfig::read()?;

            if !kubeconfig.contexts.iter().any(|c| c.name == context) {
                return Err(ConnectionError::ContextNotFound(context.to_string()));
            }

            Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                },
            )
            .await?
        }
        None => Config::infer().await?,
    };

    debug!(
        cluster_url = %config.cluster_url,
        namespace = %config.default_namespace,
        "resolved cluster config"
    );

    Ok(Client::try_from(config)?)
}
