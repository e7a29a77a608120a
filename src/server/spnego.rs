//! A minimal SPNEGO (`[MS-SPNG]`/RFC 4178) codec: just enough DER to wrap
//! and unwrap the NTLMSSP token this server actually negotiates.
//!
//! This server only ever offers one mechanism, NTLMSSP, so the general
//! mechanism-negotiation machinery SPNEGO exists for is irrelevant here;
//! what's implemented is exactly the subset needed to extract the client's
//! `mechToken`/`responseToken` and to wrap this server's own NTLM tokens
//! back up for the wire.

use std::io;

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

const TAG_SEQUENCE: u8 = 0x30;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_ENUMERATED: u8 = 0x0A;
const TAG_OID: u8 = 0x06;
const TAG_GSS_WRAPPER: u8 = 0x60; // [APPLICATION 0], constructed
const TAG_NEG_TOKEN_INIT: u8 = 0xA0; // NegotiationToken ::= [0] NegTokenInit
const TAG_NEG_TOKEN_RESP: u8 = 0xA1; // NegotiationToken ::= [1] NegTokenResp
const TAG_MECH_TYPES: u8 = 0xA0;
const TAG_MECH_TOKEN: u8 = 0xA2;
const TAG_NEG_STATE: u8 = 0xA0;
const TAG_RESPONSE_TOKEN: u8 = 0xA2;

const SPNEGO_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 2];
const NTLMSSP_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 311, 2, 2, 10];

fn encode_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(&significant);
}

fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_len(content.len(), &mut out);
    out.extend_from_slice(content);
    out
}

fn encode_base128(value: u64) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7f) as u8];
    let mut v = value >> 7;
    while v > 0 {
        bytes.push(((v & 0x7f) as u8) | 0x80);
        v >>= 7;
    }
    bytes.reverse();
    bytes
}

fn encode_oid(arcs: &[u64]) -> Vec<u8> {
    let mut body = encode_base128(arcs[0] * 40 + arcs[1]);
    for &arc in &arcs[2..] {
        body.extend(encode_base128(arc));
    }
    encode_tlv(TAG_OID, &body)
}

/// Decodes one TLV at the start of `buf`, returning `(tag, content, total_bytes_consumed)`.
fn decode_tlv(buf: &[u8]) -> io::Result<(u8, &[u8], usize)> {
    if buf.is_empty() {
        return Err(invalid("empty DER buffer"));
    }
    let tag = buf[0];
    if buf.len() < 2 {
        return Err(invalid("truncated DER length"));
    }
    let (len, len_size) = if buf[1] & 0x80 == 0 {
        (buf[1] as usize, 1)
    } else {
        let count = (buf[1] & 0x7f) as usize;
        if buf.len() < 2 + count {
            return Err(invalid("truncated DER long-form length"));
        }
        let mut len = 0usize;
        for &b in &buf[2..2 + count] {
            len = (len << 8) | b as usize;
        }
        (len, 1 + count)
    };
    let header_len = 1 + len_size;
    if buf.len() < header_len + len {
        return Err(invalid("DER content shorter than declared length"));
    }
    Ok((tag, &buf[header_len..header_len + len], header_len + len))
}

/// Scans the top-level TLVs inside `content` for the first one tagged `tag`.
fn find_tag<'a>(content: &'a [u8], tag: u8) -> Option<&'a [u8]> {
    let mut pos = 0;
    while pos < content.len() {
        let (t, inner, consumed) = decode_tlv(&content[pos..]).ok()?;
        if t == tag {
            return Some(inner);
        }
        pos += consumed;
    }
    None
}

/// Builds the client's first SPNEGO token: the GSS-API generic wrapper
/// around a `NegTokenInit` offering only NTLMSSP, carrying `ntlm_token` as
/// its `mechToken`.
pub fn wrap_neg_token_init(ntlm_token: &[u8]) -> Vec<u8> {
    let mech_type_list = encode_tlv(TAG_SEQUENCE, &encode_oid(NTLMSSP_OID));
    let mech_types_field = encode_tlv(TAG_MECH_TYPES, &mech_type_list);
    let mech_token_field = encode_tlv(TAG_MECH_TOKEN, &encode_tlv(TAG_OCTET_STRING, ntlm_token));
    let mut body = mech_types_field;
    body.extend(mech_token_field);
    let neg_token_init = encode_tlv(TAG_NEG_TOKEN_INIT, &encode_tlv(TAG_SEQUENCE, &body));

    let mut inner = encode_oid(SPNEGO_OID);
    inner.extend(neg_token_init);
    encode_tlv(TAG_GSS_WRAPPER, &inner)
}

/// Builds a server `NegTokenResp`. `accept_completed` selects
/// `accept-completed (0)` vs `accept-incomplete (1)`; `response_token` carries
/// the server's NTLM CHALLENGE or nothing once authentication has finished.
pub fn wrap_neg_token_resp(accept_completed: bool, response_token: Option<&[u8]>) -> Vec<u8> {
    let neg_state = encode_tlv(TAG_NEG_STATE, &encode_tlv(TAG_ENUMERATED, &[u8::from(!accept_completed)]));
    let mut body = neg_state;
    if let Some(tok) = response_token {
        body.extend(encode_tlv(TAG_RESPONSE_TOKEN, &encode_tlv(TAG_OCTET_STRING, tok)));
    }
    encode_tlv(TAG_NEG_TOKEN_RESP, &encode_tlv(TAG_SEQUENCE, &body))
}

/// Extracts the raw NTLMSSP token from either a GSS-wrapped `NegTokenInit`
/// (the client's first SPNEGO token) or a bare `NegTokenResp` (every token
/// after that).
pub fn unwrap_token(token: &[u8]) -> io::Result<Vec<u8>> {
    let (tag, content, _) = decode_tlv(token)?;
    match tag {
        TAG_GSS_WRAPPER => {
            let (_oid_tag, _oid, rest_start) = decode_tlv(content)?;
            let rest = &content[rest_start..];
            let (inner_tag, inner_content, _) = decode_tlv(rest)?;
            if inner_tag != TAG_NEG_TOKEN_INIT {
                return Err(invalid("expected NegTokenInit inside GSS wrapper"));
            }
            let (_seq_tag, seq_content, _) = decode_tlv(inner_content)?;
            let mech_token_field =
                find_tag(seq_content, TAG_MECH_TOKEN).ok_or_else(|| invalid("NegTokenInit has no mechToken"))?;
            let (_octet_tag, octet_content, _) = decode_tlv(mech_token_field)?;
            Ok(octet_content.to_vec())
        }
        TAG_NEG_TOKEN_RESP => {
            let (_seq_tag, seq_content, _) = decode_tlv(content)?;
            let response_field = find_tag(seq_content, TAG_RESPONSE_TOKEN)
                .ok_or_else(|| invalid("NegTokenResp has no responseToken"))?;
            let (_octet_tag, octet_content, _) = decode_tlv(response_field)?;
            Ok(octet_content.to_vec())
        }
        _ => Err(invalid("unrecognized SPNEGO token tag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neg_token_init_round_trips_the_mech_token() {
        let ntlm = b"NTLMSSP\x00fake-negotiate-message";
        let wrapped = wrap_neg_token_init(ntlm);
        let unwrapped = unwrap_token(&wrapped).unwrap();
        assert_eq!(unwrapped, ntlm);
    }

    #[test]
    fn neg_token_resp_round_trips_the_response_token() {
        let ntlm = b"NTLMSSP\x00fake-challenge-message";
        let wrapped = wrap_neg_token_resp(false, Some(ntlm));
        let unwrapped = unwrap_token(&wrapped).unwrap();
        assert_eq!(unwrapped, ntlm);
    }

    #[test]
    fn neg_token_resp_without_response_token_has_no_extractable_token() {
        let wrapped = wrap_neg_token_resp(true, None);
        assert!(unwrap_token(&wrapped).is_err());
    }

    #[test]
    fn oid_encoding_matches_known_ntlmssp_bytes() {
        // 1.3.6.1.4.1.311.2.2.10
        let encoded = encode_oid(NTLMSSP_OID);
        let (tag, content, consumed) = decode_tlv(&encoded).unwrap();
        assert_eq!(tag, TAG_OID);
        assert_eq!(consumed, encoded.len());
        assert_eq!(content, &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a][..]);
    }
}
