// src/interception/console.rs
//! Synchronous logging hook
//!
//! The record is written and published first, then the original hook is
//! always called with the untouched arguments.

use crate::interception::context::CaptureContext;
use crate::interception::formatter::RawValue;
use crate::interception::record::LogLevel;

/// Variadic logging entry point
pub trait ConsoleHook: Send + Sync {
    fn write(&self, level: LogLevel, args: &[RawValue]);
}

impl<F> ConsoleHook for F
where
    F: Fn(LogLevel, &[RawValue]) + Send + Sync,
{
    fn write(&self, level: LogLevel, args: &[RawValue]) {
        self(level, args)
    }
}

/// Recording decorator around a [`ConsoleHook`]
pub struct InterceptedConsole<H> {
    inner: H,
    ctx: CaptureContext,
}

impl<H: ConsoleHook> InterceptedConsole<H> {
    pub fn new(inner: H, ctx: CaptureContext) -> Self {
        Self { inner, ctx }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    pub fn log(&self, args: &[RawValue]) {
        self.write(LogLevel::Log, args)
    }

    pub fn info(&self, args: &[RawValue]) {
        self.write(LogLevel::Info, args)
    }

    pub fn warn(&self, args: &[RawValue]) {
        self.write(LogLevel::Warn, args)
    }

    pub fn error(&self, args: &[RawValue]) {
        self.write(LogLevel::Error, args)
    }

    pub fn debug(&self, args: &[RawValue]) {
        self.write(LogLevel::Debug, args)
    }
}

impl<H: ConsoleHook> ConsoleHook for InterceptedConsole<H> {
    fn write(&self, level: LogLevel, args: &[RawValue]) {
        self.ctx.record_log(level, args);
        self.inner.write(level, args);
    }
}
