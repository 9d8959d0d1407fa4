/// CRC16 using the CCITT polynomial (0x1021), seed 0xFFFF, no reflection, no final XOR.
///
/// This is the checksum stored in the trailer of every configuration record. It has to stay
/// bit-exact with records already written by deployed devices.
pub const fn crc16(data: &[u8]) -> u16 {
    crc16_update(0xFFFF, data)
}

/// Continue a CRC16 computation over another chunk of data.
pub const fn crc16_update(init: u16, data: &[u8]) -> u16 {
    let mut crc = init;
    let mut i = 0;

    while i < data.len() {
        crc ^= (data[i] as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
            bit += 1;
        }
        i += 1;
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_input_yields_seed() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn chunked_matches_whole() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let (head, tail) = data.split_at(17);
        assert_eq!(crc16_update(crc16(head), tail), crc16(data));
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let mut data = [0x5Au8; 64];
        let reference = crc16(&data);
        data[40] ^= 0x04;
        assert_ne!(crc16(&data), reference);
    }
}
