/// Return this error from a client's behaviour function to retire that client.
///
/// Use this when a simulated client hits a problem that makes further iterations from this
/// client pointless, for example a session that cannot be re-established, without treating
/// the whole run as broken. The pool records the iteration as failed and stops that client
/// only; the run continues with the remaining clients.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ClientBailError {
    msg: String,
}

impl Default for ClientBailError {
    fn default() -> Self {
        Self {
            msg: "Client is bailing".to_string(),
        }
    }
}
