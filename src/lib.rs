//! `rtgc`: a pluggable region-organized garbage collection core for a managed-object runtime.
//!
//! `runtime::Runtime` is the entry point most embedders want: it ties together region-based
//! heap spaces ([`heap`]), a chosen collector variant ([`gc`]), thread/mutator coordination
//! ([`thread`]), and native reference storage ([`refs`]) behind one [`util::options::Options`]
//! table. [`lang::LanguageContext`] is the narrow contract this core expects from whatever
//! embeds it; [`cli`] parses a command line into a [`runtime::RuntimeBuilder`] for the
//! standalone `rtgc-runtime` binary.

pub mod cli;
pub mod gc;
pub mod heap;
pub mod lang;
pub mod refs;
pub mod runtime;
pub mod thread;
pub mod util;
