use std::convert::TryInto;

use nom::IResult;
use nom::bytes::streaming::take;
use nom::combinator::{map, map_opt};

use crypto_box::{PublicKey, KEY_SIZE};

use super::{BufMut, BytesMut, FromBytes, ToBytes};

impl FromBytes for PublicKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(map_opt(take(KEY_SIZE), |pk: &[u8]| pk.try_into().ok()), |pk: [u8; KEY_SIZE]| pk.into())(input)
    }
}

impl ToBytes for PublicKey {
    fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_slice(self.as_bytes());
    }
}
