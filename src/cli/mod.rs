pub mod args;

/// How much diagnostic output goes to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl From<(bool, u8)> for Verbosity {
    /// `--quiet` wins over any number of `-v`.
    fn from((quiet, verbose_count): (bool, u8)) -> Self {
        match (quiet, verbose_count) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Verbose,
            (false, _) => Verbosity::Trace,
        }
    }
}

impl Verbosity {
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(Verbosity::from((true, 2)), Verbosity::Quiet);
        assert_eq!(Verbosity::from((true, 0)).as_tracing_filter(), "error");
    }

    #[test]
    fn verbose_count_maps_to_filter() {
        assert_eq!(Verbosity::from((false, 0)).as_tracing_filter(), "info");
        assert_eq!(Verbosity::from((false, 1)).as_tracing_filter(), "debug");
        assert_eq!(Verbosity::from((false, 5)).as_tracing_filter(), "trace");
    }
}
