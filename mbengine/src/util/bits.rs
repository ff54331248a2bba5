pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize + 7) / 8
}

/// pack bits LSB first, as coil and input status values travel on the wire
pub(crate) fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len().div_ceil(8)];
    for (i, _) in values.iter().enumerate().filter(|(_, set)| **set) {
        bytes[i / 8] |= 1 << (i % 8);
    }
    bytes
}

/// unpack `count` bits LSB first, returns `None` if there are not enough bytes
pub(crate) fn unpack_bits(bytes: &[u8], count: u16) -> Option<Vec<bool>> {
    if bytes.len() < num_bytes_for_bits(count) {
        return None;
    }
    Some(
        (0..count as usize)
            .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
            .collect(),
    )
}
