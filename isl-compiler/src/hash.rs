//! Contract hashing and the compile cache

use crate::context::CompilationContext;
use crate::render::render;
use isl_core::ast::Expr;
use isl_core::ir::IrNode;
use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use sha2::{Digest, Sha256};
use std::hash::BuildHasherDefault;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hex SHA-256 of the canonical rendering of normalized IR.
///
/// Two contracts that normalize to the same IR hash identically, so results
/// can be keyed by this value.
pub fn contract_hash(ir: &IrNode) -> String {
    hex::encode(Sha256::digest(render(ir).as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    expr: String,
    ctx: CompilationContext,
}

/// Cache hit statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// LRU cache from (surface expression, context) to normalized IR
pub struct CompileCache {
    entries: Mutex<LruCache<CacheKey, IrNode, BuildHasherDefault<FxHasher>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompileCache {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::with_hasher(capacity, Default::default())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(expr: &Expr, ctx: &CompilationContext) -> Option<CacheKey> {
        // Expressions that cannot be serialized are simply not cached.
        serde_json::to_string(expr).ok().map(|expr| CacheKey {
            expr,
            ctx: ctx.clone(),
        })
    }

    /// Return the cached IR, or compute, store and return it.
    pub fn get_or_try_insert<E, F>(
        &self,
        expr: &Expr,
        ctx: &CompilationContext,
        compute: F,
    ) -> Result<IrNode, E>
    where
        F: FnOnce() -> Result<IrNode, E>,
    {
        let Some(key) = Self::key(expr, ctx) else {
            return compute();
        };
        if let Some(hit) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        // Computed outside the lock; a racing thread may compute the same
        // entry, which is harmless since compilation is pure.
        let ir = compute()?;
        self.entries.lock().put(key, ir.clone());
        Ok(ir)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::normalize::normalize;

    fn hash_of(expr: &Expr) -> String {
        let ctx = CompilationContext::default();
        contract_hash(&normalize(compile(expr, &ctx).unwrap()))
    }

    #[test]
    fn test_equivalent_contracts_hash_identically() {
        let a = Expr::and(Expr::ident("x"), Expr::ident("y"));
        let b = Expr::and(Expr::ident("y"), Expr::ident("x"));
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a).len(), 64);
        assert_ne!(hash_of(&a), hash_of(&Expr::ident("x")));
    }

    #[test]
    fn test_cache_hits_after_first_compile() {
        let cache = CompileCache::new(8);
        let ctx = CompilationContext::default();
        let expr = Expr::ident("x");
        let run = || cache.get_or_try_insert(&expr, &ctx, || compile(&expr, &ctx));

        let first = run().unwrap();
        let second = run().unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keys_include_context() {
        let cache = CompileCache::new(8);
        let expr = Expr::ident("result");
        let plain = CompilationContext::default();
        let post = plain.for_postcondition();

        assert!(cache
            .get_or_try_insert(&expr, &post, || compile(&expr, &post))
            .is_ok());
        assert!(cache
            .get_or_try_insert(&expr, &plain, || compile(&expr, &plain))
            .is_err());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = CompileCache::new(1);
        let ctx = CompilationContext::default();
        for name in ["a", "b"] {
            let expr = Expr::ident(name);
            cache
                .get_or_try_insert(&expr, &ctx, || compile(&expr, &ctx))
                .unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
