//! Source scanning and pipeline construction for the CPU backend

use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::Arc;

use super::executor::CpuQueue;
use super::{CpuConfig, HostKernel, KernelRegistry};
use crate::backend::{KernelFunction, Module, Pipeline, PipelineLimits, SubmissionQueue};
use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'s> {
    Ident(&'s str),
    Punct(char),
}

/// Split kernel source into identifiers and punctuation, dropping comments
/// and whitespace.
fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some((_, '/')) => {
                    skip_line(&mut chars);
                    continue;
                }
                Some((_, '*')) => {
                    chars.next();
                    skip_block(&mut chars);
                    continue;
                }
                _ => {}
            }
        }

        if is_ident_char(c) {
            let mut end = start + c.len_utf8();
            while let Some(&(i, next)) = chars.peek() {
                if !is_ident_char(next) {
                    break;
                }
                end = i + next.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(&source[start..end]));
        } else {
            tokens.push(Token::Punct(c));
        }
    }

    tokens
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_line(chars: &mut Peekable<CharIndices<'_>>) {
    for (_, c) in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block(chars: &mut Peekable<CharIndices<'_>>) {
    let mut prev = '\0';
    for (_, c) in chars.by_ref() {
        if prev == '*' && c == '/' {
            break;
        }
        prev = c;
    }
}

/// Entry points declared as `kernel void <name>(` in source order, without
/// duplicates.
pub(crate) fn declared_kernels(source: &str) -> Vec<String> {
    let tokens = tokenize(source);
    let mut names: Vec<String> = Vec::new();

    for window in tokens.windows(4) {
        if let [Token::Ident("kernel"), Token::Ident("void"), Token::Ident(name), Token::Punct('(')] = window {
            if !names.iter().any(|known| known == name) {
                names.push((*name).to_string());
            }
        }
    }

    names
}

pub(crate) struct CpuModule {
    declared: Vec<String>,
    kernels: KernelRegistry,
    config: CpuConfig,
}

impl CpuModule {
    pub(crate) fn new(declared: Vec<String>, kernels: KernelRegistry, config: CpuConfig) -> Self {
        Self {
            declared,
            kernels,
            config,
        }
    }
}

impl Module for CpuModule {
    fn function(&self, name: &str) -> Option<Box<dyn KernelFunction>> {
        if !self.declared.iter().any(|declared| declared == name) {
            return None;
        }

        Some(Box::new(CpuFunction {
            name: name.to_string(),
            kernel: self.kernels.read().get(name).cloned(),
            config: self.config,
        }))
    }

    fn function_names(&self) -> Vec<String> {
        self.declared.clone()
    }
}

struct CpuFunction {
    name: String,
    kernel: Option<Arc<dyn HostKernel>>,
    config: CpuConfig,
}

impl KernelFunction for CpuFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_pipeline(&self) -> Result<Box<dyn Pipeline>> {
        let kernel = self
            .kernel
            .clone()
            .ok_or_else(|| DriverError::Pipeline(format!("no host kernel registered for '{}'", self.name)))?;

        Ok(Box::new(CpuPipeline {
            name: Arc::from(self.name.as_str()),
            kernel,
            limits: PipelineLimits {
                lockstep_width: self.config.lockstep_width,
                max_threads_per_group: self.config.max_threads_per_group,
            },
        }))
    }
}

struct CpuPipeline {
    name: Arc<str>,
    kernel: Arc<dyn HostKernel>,
    limits: PipelineLimits,
}

impl Pipeline for CpuPipeline {
    fn limits(&self) -> PipelineLimits {
        self.limits
    }

    fn new_queue(&self) -> Result<Box<dyn SubmissionQueue>> {
        Ok(Box::new(CpuQueue::new(Arc::clone(&self.name), Arc::clone(&self.kernel))))
    }
}
