//! Typed runtime options.
//!
//! Each option is stored as an [`RtgcOption<T>`], which pairs a value with a validator and
//! flags saying whether it may be set from an environment variable or from the command
//! line (see `option_table!` below).

use crate::gc::collector::CollectorKind;
use std::fmt::Debug;
use std::str::FromStr;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn positive_usize(v: &usize) -> bool {
    *v > 0
}

/// A single option of type `T`, with metadata about where it may legally be set from.
#[derive(Clone)]
pub struct RtgcOption<T: Debug + Clone> {
    value: T,
    validator: fn(&T) -> bool,
    from_env_var: bool,
    from_command_line: bool,
}

impl<T: Debug + Clone> RtgcOption<T> {
    pub fn new(value: T, validator: fn(&T) -> bool, from_env_var: bool, from_command_line: bool) -> Self {
        RtgcOption { value, validator, from_env_var, from_command_line }
    }

    /// Set the option, running its validator. Returns `false` (leaving the old value in
    /// place) if the new value is rejected.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            true
        } else {
            false
        }
    }
}

impl<T: Debug + Clone> std::ops::Deref for RtgcOption<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

/// Generates an `Options` struct with one field per option, plus `set_from_env_var`,
/// `set_from_command_line`, and `set_bulk_from_command_line` dispatchers. This crate has a
/// handful of options, not dozens, so there's no env-var auto-discovery machinery here —
/// just a hand-listed table.
macro_rules! option_table {
    ($($name:ident: $ty:ty [env_var: $env_var:expr, command_line: $command_line:expr] [$validator:expr] = $default:expr),* $(,)?) => {
        #[derive(Clone)]
        pub struct Options {
            $(pub $name: RtgcOption<$ty>),*
        }

        impl Options {
            fn new() -> Self {
                Options {
                    $($name: RtgcOption::new($default, $validator, $env_var, $command_line)),*
                }
            }

            pub fn set_from_env_var(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => {
                        assert!(self.$name.from_env_var, "cannot set option {key} from an environment variable");
                        self.set_inner(key, val)
                    })*
                    _ => false,
                }
            }

            pub fn set_from_command_line(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => {
                        assert!(self.$name.from_command_line, "cannot set option {key} from the command line");
                        self.set_inner(key, val)
                    })*
                    _ => {
                        eprintln!("Warn: unrecognized option {key}");
                        false
                    }
                }
            }

            /// Parse `key=value` pairs separated by whitespace or commas.
            pub fn set_bulk_from_command_line(&mut self, options: &str) -> bool {
                for opt in options.replace(',', " ").split_ascii_whitespace() {
                    let mut parts = opt.splitn(2, '=');
                    let (Some(key), Some(val)) = (parts.next(), parts.next()) else { return false };
                    if !self.set_from_command_line(key, val) {
                        return false;
                    }
                }
                true
            }

            fn set_inner(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => {
                        if let Ok(typed) = val.parse::<$ty>() {
                            let ok = self.$name.set(typed);
                            if !ok {
                                eprintln!("Warn: unable to set {key}={val:?}: rejected by validator, keeping default");
                            }
                            ok
                        } else {
                            eprintln!("Warn: unable to set {key}={val:?}: cannot parse as {}", stringify!($ty));
                            false
                        }
                    })*
                    _ => panic!("invalid option key: {key}"),
                }
            }

            /// Apply `RTGC_<OPTION>` environment variable overrides.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "RTGC_";
                for (key, val) in std::env::vars() {
                    if let Some(rest) = key.strip_prefix(PREFIX) {
                        let lowercase = rest.to_lowercase();
                        $(if lowercase == stringify!($name) {
                            self.set_from_env_var(&lowercase, &val);
                        })*
                    }
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

option_table! {
    gc_type: CollectorKind [env_var: true, command_line: true] [always_valid] = CollectorKind::Generational,
    heap_size_limit: usize [env_var: true, command_line: true] [positive_usize] = 512 * crate::util::constants::BYTES_IN_MBYTE,
    young_space_size: usize [env_var: true, command_line: true] [positive_usize] = 16 * crate::util::constants::BYTES_IN_MBYTE,
    no_async_jit: bool [env_var: true, command_line: true] [always_valid] = false,
    run_gc_in_place: bool [env_var: true, command_line: true] [always_valid] = false,
    pre_gc_heap_verification: bool [env_var: true, command_line: true] [always_valid] = false,
    post_gc_heap_verification: bool [env_var: true, command_line: true] [always_valid] = false,
    fail_on_heap_verification: bool [env_var: true, command_line: true] [always_valid] = false,
    print_memory_statistics: bool [env_var: true, command_line: true] [always_valid] = false,
    print_gc_statistics: bool [env_var: true, command_line: true] [always_valid] = false,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = Options::default();
        assert_eq!(*opts.gc_type, CollectorKind::Generational);
        assert!(*opts.heap_size_limit > 0);
    }

    #[test]
    fn bulk_parses_key_value_pairs() {
        let mut opts = Options::default();
        assert!(opts.set_bulk_from_command_line("heap_size_limit=1048576,print_gc_statistics=true"));
        assert_eq!(*opts.heap_size_limit, 1048576);
        assert!(*opts.print_gc_statistics);
    }

    #[test]
    fn rejects_unknown_key() {
        let mut opts = Options::default();
        assert!(!opts.set_bulk_from_command_line("not_a_real_option=1"));
    }

    #[test]
    fn gc_type_parses_from_str() {
        let mut opts = Options::default();
        assert!(opts.set_from_command_line("gc_type", "g1-gc"));
        assert_eq!(*opts.gc_type, CollectorKind::G1);
        assert!(!opts.set_from_command_line("gc_type", "bogus"));
    }
}
