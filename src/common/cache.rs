use dashmap::DashMap;
use once_cell::sync::Lazy;
use solana_sdk::pubkey::Pubkey;

/// Decimals and owning token program per mint. Both are immutable once a
/// mint is initialized, so entries never expire.
#[derive(Default)]
pub struct MintCache {
    mints: DashMap<Pubkey, (u8, Pubkey)>,
}

impl MintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mint: &Pubkey) -> Option<(u8, Pubkey)> {
        self.mints.get(mint).map(|entry| *entry.value())
    }

    pub fn insert(&self, mint: Pubkey, decimals: u8, token_program: Pubkey) {
        self.mints.insert(mint, (decimals, token_program));
    }

    pub fn remove(&self, mint: &Pubkey) {
        self.mints.remove(mint);
    }

    pub fn size(&self) -> usize {
        self.mints.len()
    }
}

pub static MINT_CACHE: Lazy<MintCache> = Lazy::new(MintCache::new);
