// DNSSEC test vectors: deterministic Ed25519/P-256 keys and signatures
// over fixed RRsets (TTL 3600, inception 1600000000, expiration
// 4000000000), canonical form per RFC 4034.

pub const ROOT_PUBKEY: &str = "03a107bff3ce10be1d70dd18e74bc09967e4d6309ba50d5f1ddc8664125531b8";
pub const COM_PUBKEY: &str = "29acbae141bccaf0b22e1a94d34d0bc7361e526d0bfe12c89794bc9322966dd7";
pub const ROOT_KEY_TAG: u16 = 34259;
pub const COM_KEY_TAG: u16 = 11530;
pub const ROOT_DS_DIGEST: &str = "cb1d360e1ae51edb97e1e8a4446c41790bb611d34f5040bbac01f71ab966cb41";
pub const COM_DS_DIGEST: &str = "f71864189e42db921e66fd59676124cc8ed76b072b88eebb88fa7cb4025166e4";
pub const ROOT_DNSKEY_SIG: &str = "6e08ec720b811e020b3b90ba7608349539f1528782606c6cabf640ad4c28ad251851040195e4927916bebb0c11bb40e93f076663ebfb8091b64428487260bc0a";
pub const ROOT_NS_SIG: &str = "7b2856c5f7b3ceb7bee40999fb554b2c426692477e828d43029d10d037e6709d0b3edd97c8c3c3eb2537cfb2ab8ddc910c2cde358ba79a5d8f211af8abad4200";
pub const COM_DS_SIG: &str = "b0e131111afb055ab866dac1945f669d19190beb8d688c0940627fbecb26569daeb1fc846e0d8a02d0860043c23dfdab244c6f293eec0c878f017e72b3904607";
pub const COM_DNSKEY_SIG: &str = "aba350265fac05bd39665bc6deac61b29d6d32e51b2edb3346f11513a837beb78b3ee81802b03757acbd9c78135c51074344b4bb7e6e036fd23c9fceefdc3301";
pub const A_COM_SIG: &str = "1ae90c9abe671dd1b28763b840bf33f46c7888fd07d819c0d160efdfd35fcaee5eca23d63cc4b1897b2960943d16a4383959d1d2b6b0600d9bfd348800bd750d";
pub const P256_PUBKEY: &str = "60fed4ba255a9d31c961eb74c6356d68c049b8923b61fa6ce669622e60f29fb67903fe1008b8bc99a41ae9e95628bc64f2f1b20c2d7e9f5177a3c294d4462299";
pub const P256_KEY_TAG: u16 = 23697;
pub const P256_SIG: &str = "c782425250bc36d618686997bf7583c115e514002ddd09c1fc8fc6df0abd81aebac9ab72d7e83fa7b43cccffe7584a462c26ce7651a8ee5d767bc8f0e2baa0f7";

pub const SIG_TTL: u32 = 3600;
pub const SIG_INCEPTION: u32 = 1600000000;
pub const SIG_EXPIRATION: u32 = 4000000000;
