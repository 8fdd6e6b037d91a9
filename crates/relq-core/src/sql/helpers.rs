use crate::error::{RelqError, Result};

/// Backtick-quote a single identifier. Any name is accepted except an empty
/// one or one carrying NUL; embedded backticks are doubled.
pub(crate) fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(RelqError::InvalidIdentifier("empty".into()));
    }
    if name.contains('\0') {
        return Err(RelqError::InvalidIdentifier(format!("NUL in `{}`", name.escape_debug())));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_backticks() {
        assert_eq!(quote_ident("id").unwrap(), "`id`");
        assert_eq!(quote_ident("City Name").unwrap(), "`City Name`");
        assert_eq!(quote_ident("we`ird").unwrap(), "`we``ird`");
        assert!(quote_ident("").is_err());
    }

}
