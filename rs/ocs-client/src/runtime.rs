use std::sync::{Arc, LazyLock};

use tokio::runtime::Handle;

use crate::Error;

static BACKGROUND: LazyLock<Result<Handle, Arc<std::io::Error>>> = LazyLock::new(|| {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
	let handle = runtime.handle().clone();

	std::thread::Builder::new().name("ocs-client".into()).spawn(move || {
		runtime.block_on(std::future::pending::<()>());
	})?;

	Ok(handle)
});

/// The runtime used to drive sessions.
///
/// Returns the ambient runtime when called within one, otherwise a dedicated
/// background thread is started on first use so synchronous frame loops work too.
pub fn handle() -> Result<Handle, Error> {
	if let Ok(handle) = Handle::try_current() {
		return Ok(handle);
	}

	BACKGROUND.clone().map_err(Error::Runtime)
}
