pub mod cli;
pub mod discovery;
pub mod driver;
pub mod expand;
pub mod item;
pub mod marker;
pub mod output;
pub mod resolver;
pub mod result;
pub mod scheduler;
pub mod worker;

#[cfg(feature = "extension-module")]
use pyo3::prelude::*;

/// CLI entry point for the `parrun` command.
/// Called from Python via a console_scripts entrypoint.
#[cfg(feature = "extension-module")]
#[pyfunction]
fn main() {
    let code = cli::run();
    std::process::exit(code);
}

/// PyO3 module definition
#[cfg(feature = "extension-module")]
#[pymodule]
fn _parrun(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(main, m)?)?;
    Ok(())
}
