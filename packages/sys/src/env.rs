//! Environment variables with POSIX argument checking.

use crate::errno::Errno;

fn validate_name(name: &str) -> Result<(), Errno> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

/// Look up a variable. Unset and non-UTF-8 values both read as `None`.
pub fn getenv(name: &str) -> Option<String> {
    if validate_name(name).is_err() {
        return None;
    }
    std::env::var(name).ok()
}

/// Set a variable. An existing value is kept unless `overwrite` is true.
pub fn setenv(name: &str, value: &str, overwrite: bool) -> Result<(), Errno> {
    validate_name(name)?;
    if value.contains('\0') {
        return Err(Errno::EINVAL);
    }

    if !overwrite && std::env::var_os(name).is_some() {
        return Ok(());
    }
    std::env::set_var(name, value);
    Ok(())
}

/// Remove a variable. Removing an unset variable succeeds.
pub fn unsetenv(name: &str) -> Result<(), Errno> {
    validate_name(name)?;
    std::env::remove_var(name);
    Ok(())
}
