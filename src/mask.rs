/// XOR-masks `data` in place with the 4-byte key, cycling the key over the
/// whole range. Applying the same key twice reproduces the original bytes,
/// so the same function both masks and unmasks a payload.
pub fn apply(key: [u8; 4], data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
