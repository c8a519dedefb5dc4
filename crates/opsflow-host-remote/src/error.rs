/// No response could be obtained from the host.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
  /// The transport could not reach or authenticate against the host.
  #[error("failed to connect to {address}: {message}")]
  Connection { address: String, message: String },

  /// The local transport process could not be started.
  #[error("failed to start remote transport: {0}")]
  Spawn(#[from] std::io::Error),
}
