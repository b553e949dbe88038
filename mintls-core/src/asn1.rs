//! Schema-driven DER decoding.
//!
//! Rather than a general ASN.1 library, this walks a DER buffer against a
//! static [`Schema`] tree and records every element it visits under a
//! dotted fully-qualified name, e.g.
//! `certificate[0].tbsCertificate.subjectPublicKeyInfo.subjectPublicKey`.
//! Callers then look elements up by name. Elements inside a SET or a
//! repeated container get a `[index]` suffix.
//!
//! Only definite lengths and single-byte tag numbers are supported; that
//! covers every certificate and key this stack handles.

use tracing::trace;

use crate::error::{Asn1Error, Result};

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTF8_STRING: u8 = 0x0c;
pub const TAG_PRINTABLE_STRING: u8 = 0x13;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// How a schema node consumes the elements inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    /// Leaf; content is not recursed into even if constructed
    Primitive,

    /// Fixed field list, one child schema per element in order
    Sequence,

    /// SEQUENCE OF / SET OF; one child schema matched repeatedly
    Repeated,
}

/// One node of a static schema tree.
///
/// A node with an empty name contributes nothing to the qualified name of
/// its children, which is how explicitly-tagged wrappers like the X.509
/// `[0] version` stay transparent.
#[derive(Clone, Copy, Debug)]
pub struct Schema {
    pub name: &'static str,
    pub kind: SchemaKind,
    /// Expected identifier octet; `None` matches anything.
    pub tag: Option<u8>,
    pub optional: bool,
    pub children: &'static [Schema],
}

/// A decoded element: a tag and a content range into the buffer held by
/// [`Decoded`].
#[derive(Clone, Debug)]
pub struct Element {
    pub fqn: String,
    pub tag: u8,
    pub start: usize,
    pub len: usize,
}

impl Element {
    pub fn constructed(&self) -> bool {
        self.tag & 0x20 != 0
    }
}

/// The result of a schema decode: the input buffer plus every element
/// found in it.
pub struct Decoded {
    data: Vec<u8>,
    elements: Vec<Element>,
}

impl Decoded {
    pub fn find(&self, fqn: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.fqn == fqn)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn bytes(&self, element: &Element) -> &[u8] {
        &self.data[element.start..element.start + element.len]
    }

    /// Content bytes of a required element.
    pub fn require(&self, fqn: &str) -> Result<&[u8]> {
        let element = self
            .find(fqn)
            .ok_or_else(|| Asn1Error::MissingField(fqn.to_owned()))?;
        Ok(self.bytes(element))
    }
}

/// Decode `data` against `schema`, which must be a virtual file-level
/// container: its children describe the top-level DER elements.
pub fn decode(data: Vec<u8>, schema: &Schema) -> Result<Decoded> {
    let mut elements = Vec::new();
    let end = data.len();
    decode_container(&data, 0, end, schema, "", &mut elements)?;
    Ok(Decoded { data, elements })
}

/// Decode without a schema. Every element is recorded under its tag name
/// with a per-container index, e.g. `SEQUENCE[0].INTEGER[1]`; useful for
/// inspecting DER this stack has no schema for.
pub fn decode_any(data: Vec<u8>) -> Result<Decoded> {
    let mut elements = Vec::new();
    let end = data.len();
    walk_any(&data, 0, end, "", &mut elements)?;
    Ok(Decoded { data, elements })
}

fn walk_any(
    data: &[u8],
    mut pos: usize,
    end: usize,
    prefix: &str,
    out: &mut Vec<Element>,
) -> Result<()> {
    let mut idx = 0;
    while pos < end {
        let (tag, content_start, content_len) = parse_header(data, pos, end)?;
        let fqn = format!("{prefix}{}[{idx}]", tag_name(tag));
        out.push(Element {
            fqn: fqn.clone(),
            tag,
            start: content_start,
            len: content_len,
        });
        if tag & 0x20 != 0 {
            walk_any(data, content_start, content_start + content_len, &(fqn + "."), out)?;
        }
        pos = content_start + content_len;
        idx += 1;
    }
    Ok(())
}

fn decode_container(
    data: &[u8],
    mut pos: usize,
    end: usize,
    container: &Schema,
    prefix: &str,
    out: &mut Vec<Element>,
) -> Result<()> {
    let bracketed =
        container.kind == SchemaKind::Repeated || container.tag == Some(TAG_SET);
    let mut field_idx = 0;
    let mut elem_idx = 0;
    while pos < end {
        let (tag, content_start, content_len) = parse_header(data, pos, end)?;
        let field = loop {
            let field = container
                .children
                .get(field_idx)
                .ok_or(Asn1Error::UnexpectedField)?;
            match field.tag {
                Some(expected) if expected != tag => {
                    if field.optional && container.kind == SchemaKind::Sequence {
                        field_idx += 1;
                        continue;
                    }
                    return Err(Asn1Error::WrongTag.into());
                }
                _ => break field,
            }
        };

        let mut fqn = String::with_capacity(prefix.len() + field.name.len() + 4);
        fqn.push_str(prefix);
        fqn.push_str(field.name);
        if bracketed {
            fqn.push_str(&format!("[{elem_idx}]"));
        }
        trace!(fqn = %fqn, tag = tag_name(tag), len = content_len, "asn.1 element");
        out.push(Element {
            fqn: fqn.clone(),
            tag,
            start: content_start,
            len: content_len,
        });

        if !field.children.is_empty() {
            let child_prefix = if field.name.is_empty() && !bracketed {
                fqn
            } else {
                fqn + "."
            };
            decode_container(
                data,
                content_start,
                content_start + content_len,
                field,
                &child_prefix,
                out,
            )?;
        }

        pos = content_start + content_len;
        if container.kind == SchemaKind::Sequence {
            field_idx += 1;
        }
        elem_idx += 1;
    }

    if container.kind == SchemaKind::Sequence {
        while let Some(field) = container.children.get(field_idx) {
            if !field.optional {
                return Err(Asn1Error::Eof.into());
            }
            field_idx += 1;
        }
    }
    Ok(())
}

/// Parse an identifier octet and a definite length. Returns the tag, the
/// content offset, and the content length.
fn parse_header(data: &[u8], pos: usize, end: usize) -> Result<(u8, usize, usize)> {
    if pos >= end {
        return Err(Asn1Error::Eof.into());
    }
    let tag = data[pos];
    if tag & 0x1f == 0x1f {
        return Err(Asn1Error::UnsupportedTag.into());
    }
    let mut p = pos + 1;
    if p >= end {
        return Err(Asn1Error::Eof.into());
    }
    let first = data[p];
    p += 1;
    let content_len = if first == 0x80 {
        return Err(Asn1Error::UnsupportedLength.into());
    } else if first & 0x80 != 0 {
        let nbytes = (first & 0x7f) as usize;
        if p + nbytes > end {
            return Err(Asn1Error::Eof.into());
        }
        let mut len = 0usize;
        for &b in &data[p..p + nbytes] {
            len = len << 8 | b as usize;
        }
        p += nbytes;
        len
    } else {
        first as usize
    };
    if content_len > end - p {
        return Err(Asn1Error::Eof.into());
    }
    Ok((tag, p, content_len))
}

/// Human-readable universal tag name, for trace output.
pub fn tag_name(tag: u8) -> &'static str {
    match tag & 0x1f {
        0x01 => "BOOLEAN",
        0x02 => "INTEGER",
        0x03 => "BIT STRING",
        0x04 => "OCTET STRING",
        0x05 => "NULL",
        0x06 => "OBJECT IDENTIFIER",
        0x0c => "UTF8String",
        0x10 => "SEQUENCE",
        0x11 => "SET",
        0x13 => "PrintableString",
        0x14 => "T61String",
        0x16 => "IA5String",
        0x17 => "UTCTime",
        _ => "unknown",
    }
}

const fn leaf(name: &'static str, tag: u8) -> Schema {
    Schema {
        name,
        kind: SchemaKind::Primitive,
        tag: Some(tag),
        optional: false,
        children: &[],
    }
}

const fn any(name: &'static str) -> Schema {
    Schema {
        name,
        kind: SchemaKind::Primitive,
        tag: None,
        optional: false,
        children: &[],
    }
}

const ALGORITHM_IDENTIFIER_FIELDS: [Schema; 2] = [
    leaf("algorithm", TAG_OID),
    Schema {
        optional: true,
        ..any("parameters")
    },
];

const fn algorithm_identifier(name: &'static str) -> Schema {
    Schema {
        name,
        kind: SchemaKind::Sequence,
        tag: Some(TAG_SEQUENCE),
        optional: false,
        children: &ALGORITHM_IDENTIFIER_FIELDS,
    }
}

const ATTRIBUTE: Schema = Schema {
    name: "attribute",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[leaf("type", TAG_OID), any("value")],
};

const RDN: Schema = Schema {
    name: "rdn",
    kind: SchemaKind::Repeated,
    tag: Some(TAG_SET),
    optional: false,
    children: &[ATTRIBUTE],
};

/// X.501 Name: SEQUENCE OF SET OF AttributeTypeAndValue.
const fn name_schema(name: &'static str) -> Schema {
    Schema {
        name,
        kind: SchemaKind::Repeated,
        tag: Some(TAG_SEQUENCE),
        optional: false,
        children: &[RDN],
    }
}

const VALIDITY: Schema = Schema {
    name: "validity",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[leaf("notBefore", TAG_UTC_TIME), leaf("notAfter", TAG_UTC_TIME)],
};

const SUBJECT_PUBLIC_KEY_INFO: Schema = Schema {
    name: "subjectPublicKeyInfo",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[
        algorithm_identifier("algorithmIdentifier"),
        leaf("subjectPublicKey", TAG_BIT_STRING),
    ],
};

// Explicitly tagged version wrapper; the empty name keeps "version"
// directly under tbsCertificate in lookups.
const VERSION_WRAPPER: Schema = Schema {
    name: "",
    kind: SchemaKind::Sequence,
    tag: Some(0xa0),
    optional: false,
    children: &[leaf("version", TAG_INTEGER)],
};

const EXTENSION: Schema = Schema {
    name: "extension",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[
        leaf("extnId", TAG_OID),
        Schema {
            optional: true,
            ..leaf("critical", TAG_BOOLEAN)
        },
        leaf("extnValue", TAG_OCTET_STRING),
    ],
};

const EXTENSIONS: Schema = Schema {
    name: "extensions",
    kind: SchemaKind::Repeated,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[EXTENSION],
};

// Explicitly tagged [3] wrapper around the extension list.
const EXTENSIONS_WRAPPER: Schema = Schema {
    name: "",
    kind: SchemaKind::Sequence,
    tag: Some(0xa3),
    optional: true,
    children: &[EXTENSIONS],
};

const TBS_CERTIFICATE: Schema = Schema {
    name: "tbsCertificate",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[
        VERSION_WRAPPER,
        leaf("serialNumber", TAG_INTEGER),
        algorithm_identifier("signature"),
        name_schema("issuer"),
        VALIDITY,
        name_schema("subject"),
        SUBJECT_PUBLIC_KEY_INFO,
        Schema {
            optional: true,
            ..leaf("issuerUniqueID", 0xa1)
        },
        Schema {
            optional: true,
            ..leaf("subjectUniqueID", 0xa2)
        },
        EXTENSIONS_WRAPPER,
    ],
};

const CERTIFICATE: Schema = Schema {
    name: "certificate",
    kind: SchemaKind::Sequence,
    tag: Some(TAG_SEQUENCE),
    optional: false,
    children: &[
        TBS_CERTIFICATE,
        algorithm_identifier("signatureAlgorithm"),
        leaf("signatureValue", TAG_BIT_STRING),
    ],
};

/// File-level schema for DER certificates; tolerates several concatenated
/// certificates, named `certificate[0]`, `certificate[1]`, ...
pub const X509_CERTIFICATE: Schema = Schema {
    name: "certfile",
    kind: SchemaKind::Repeated,
    tag: None,
    optional: false,
    children: &[CERTIFICATE],
};

/// PKCS#1 RSAPrivateKey file.
pub const RSA_PRIVATE_KEY: Schema = Schema {
    name: "privkeyfile",
    kind: SchemaKind::Sequence,
    tag: None,
    optional: false,
    children: &[Schema {
        name: "privkey",
        kind: SchemaKind::Sequence,
        tag: Some(TAG_SEQUENCE),
        optional: false,
        children: &[
            leaf("version", TAG_INTEGER),
            leaf("modulus", TAG_INTEGER),
            leaf("publicExponent", TAG_INTEGER),
            leaf("privateExponent", TAG_INTEGER),
            leaf("prime1", TAG_INTEGER),
            leaf("prime2", TAG_INTEGER),
            leaf("exponent1", TAG_INTEGER),
            leaf("exponent2", TAG_INTEGER),
            leaf("coefficient", TAG_INTEGER),
        ],
    }],
};

/// PKCS#1 RSAPublicKey, as found inside the subjectPublicKey bit string.
pub const RSA_PUBLIC_KEY: Schema = Schema {
    name: "pubkeyfile",
    kind: SchemaKind::Sequence,
    tag: None,
    optional: false,
    children: &[Schema {
        name: "pubkey",
        kind: SchemaKind::Sequence,
        tag: Some(TAG_SEQUENCE),
        optional: false,
        children: &[
            leaf("modulus", TAG_INTEGER),
            leaf("publicExponent", TAG_INTEGER),
        ],
    }],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    // SEQUENCE { INTEGER 0x00AB12, INTEGER 3 }
    fn pubkey_der() -> Vec<u8> {
        vec![0x30, 0x08, 0x02, 0x03, 0x00, 0xab, 0x12, 0x02, 0x01, 0x03]
    }

    #[test]
    fn test_decode_public_key() {
        let d = decode(pubkey_der(), &RSA_PUBLIC_KEY).unwrap();
        assert_eq!(d.require("pubkey.modulus").unwrap(), &[0x00, 0xab, 0x12]);
        assert_eq!(d.require("pubkey.publicExponent").unwrap(), &[0x03]);
        let el = d.find("pubkey").unwrap();
        assert_eq!(el.tag, TAG_SEQUENCE);
        assert!(el.constructed());
    }

    #[test]
    fn test_missing_field_lookup() {
        let d = decode(pubkey_der(), &RSA_PUBLIC_KEY).unwrap();
        assert_eq!(
            d.require("pubkey.nonexistent"),
            Err(Error::Asn1(Asn1Error::MissingField(
                "pubkey.nonexistent".into()
            )))
        );
    }

    #[test]
    fn test_truncated_input_is_eof() {
        let mut der = pubkey_der();
        der.truncate(6);
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::Eof))
        ));
    }

    #[test]
    fn test_missing_trailing_field_is_eof() {
        // SEQUENCE { INTEGER 1 } is short of the schema's two integers
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x01];
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::Eof))
        ));
    }

    #[test]
    fn test_wrong_tag() {
        // OCTET STRING where an INTEGER is expected
        let der = vec![0x30, 0x06, 0x04, 0x01, 0xab, 0x02, 0x01, 0x03];
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::WrongTag))
        ));
    }

    #[test]
    fn test_extra_element_is_unexpected_field() {
        let der = vec![
            0x30, 0x09, 0x02, 0x01, 0x01, 0x02, 0x01, 0x03, 0x02, 0x01, 0x05,
        ];
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::UnexpectedField))
        ));
    }

    #[test]
    fn test_multibyte_tag_rejected() {
        let der = vec![0x30, 0x03, 0x1f, 0x81, 0x00];
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::UnsupportedTag))
        ));
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let der = vec![0x30, 0x80, 0x00, 0x00];
        assert!(matches!(
            decode(der, &RSA_PUBLIC_KEY),
            Err(Error::Asn1(Asn1Error::UnsupportedLength))
        ));
    }

    #[test]
    fn test_long_form_length() {
        // SEQUENCE with a 0x81-prefixed length holding one 200-byte INTEGER
        let mut der = vec![0x30, 0x81, 0xce, 0x02, 0x81, 0xc8];
        der.extend(std::iter::repeat(0x55).take(200));
        der.extend_from_slice(&[0x02, 0x01, 0x03]);
        let d = decode(der, &RSA_PUBLIC_KEY).unwrap();
        assert_eq!(d.require("pubkey.modulus").unwrap().len(), 200);
    }

    #[test]
    fn test_set_elements_are_bracketed() {
        // A Name: SEQUENCE { SET { SEQUENCE { OID 2.5.4.3, PrintableString "x" } } }
        const NAME_FILE: Schema = Schema {
            name: "namefile",
            kind: SchemaKind::Sequence,
            tag: None,
            optional: false,
            children: &[name_schema("subject")],
        };
        let der = vec![
            0x30, 0x0c, 0x31, 0x0a, 0x30, 0x08, 0x06, 0x03, 0x55, 0x04, 0x03, 0x13, 0x01,
            b'x',
        ];
        let d = decode(der, &NAME_FILE).unwrap();
        assert!(d.find("subject.rdn[0]").is_some());
        assert_eq!(
            d.require("subject.rdn[0].attribute[0].value").unwrap(),
            b"x"
        );
    }

    #[test]
    fn test_decode_any_names_by_tag() {
        let d = decode_any(pubkey_der()).unwrap();
        assert_eq!(d.require("SEQUENCE[0].INTEGER[0]").unwrap(), &[0x00, 0xab, 0x12]);
        assert_eq!(d.require("SEQUENCE[0].INTEGER[1]").unwrap(), &[0x03]);
    }

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        match content.len() {
            n if n < 128 => out.push(n as u8),
            n if n < 256 => out.extend([0x81, n as u8]),
            n => out.extend([0x82, (n >> 8) as u8, n as u8]),
        }
        out.extend_from_slice(content);
        out
    }

    fn cat(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_v3_certificate_extensions() {
        let algid = tlv(0x30, &cat(&[tlv(TAG_OID, &[0x2a]), tlv(TAG_NULL, &[])]));
        let name = tlv(
            0x30,
            &tlv(
                0x31,
                &tlv(
                    0x30,
                    &cat(&[tlv(TAG_OID, &[0x55, 0x04, 0x03]), tlv(0x13, b"x")]),
                ),
            ),
        );
        let validity = tlv(
            0x30,
            &cat(&[tlv(0x17, b"260101000000Z"), tlv(0x17, b"270101000000Z")]),
        );
        let spki = tlv(0x30, &cat(&[algid.clone(), tlv(0x03, &[0x00, 0x99])]));
        // basicConstraints with critical set, then a keyIdentifier without it
        let ext1 = tlv(
            0x30,
            &cat(&[
                tlv(TAG_OID, &[0x55, 0x1d, 0x13]),
                tlv(TAG_BOOLEAN, &[0xff]),
                tlv(TAG_OCTET_STRING, &[0x30, 0x00]),
            ]),
        );
        let ext2 = tlv(
            0x30,
            &cat(&[
                tlv(TAG_OID, &[0x55, 0x1d, 0x0e]),
                tlv(TAG_OCTET_STRING, &[0xab]),
            ]),
        );
        let extensions = tlv(0xa3, &tlv(0x30, &cat(&[ext1, ext2])));
        let tbs = tlv(
            0x30,
            &cat(&[
                tlv(0xa0, &tlv(TAG_INTEGER, &[0x02])),
                tlv(TAG_INTEGER, &[0x01]),
                algid.clone(),
                name.clone(),
                validity,
                name,
                spki,
                extensions,
            ]),
        );
        let der = tlv(0x30, &cat(&[tbs, algid, tlv(0x03, &[0x00])]));

        let d = decode(der, &X509_CERTIFICATE).unwrap();
        let prefix = "certificate[0].tbsCertificate";
        assert!(d.find(&format!("{prefix}.extensions")).is_some());
        assert_eq!(
            d.require(&format!("{prefix}.extensions.extension[0].extnId"))
                .unwrap(),
            &[0x55, 0x1d, 0x13]
        );
        assert_eq!(
            d.require(&format!("{prefix}.extensions.extension[0].critical"))
                .unwrap(),
            &[0xff]
        );
        assert_eq!(
            d.require(&format!("{prefix}.extensions.extension[1].extnValue"))
                .unwrap(),
            &[0xab]
        );
        assert!(d
            .find(&format!("{prefix}.extensions.extension[1].critical"))
            .is_none());
        assert!(d.find(&format!("{prefix}.issuerUniqueID")).is_none());
    }

    #[test]
    fn test_parse_real_certificate() {
        let der = include_bytes!("../tests/data/test-cert.der").to_vec();
        let d = decode(der, &X509_CERTIFICATE).unwrap();
        assert_eq!(
            d.require("certificate[0].tbsCertificate.version").unwrap(),
            &[0x02]
        );
        let spk = d
            .require("certificate[0].tbsCertificate.subjectPublicKeyInfo.subjectPublicKey")
            .unwrap();
        // bit strings carry an unused-bits count first
        assert_eq!(spk[0], 0);
        let inner = decode(spk[1..].to_vec(), &RSA_PUBLIC_KEY).unwrap();
        // 2048-bit modulus with a leading zero octet
        assert_eq!(inner.require("pubkey.modulus").unwrap().len(), 257);
    }

    #[test]
    fn test_parse_real_private_key() {
        let der = include_bytes!("../tests/data/test-key.der").to_vec();
        let d = decode(der, &RSA_PRIVATE_KEY).unwrap();
        assert_eq!(d.require("privkey.version").unwrap(), &[0x00]);
        for field in [
            "privkey.modulus",
            "privkey.publicExponent",
            "privkey.privateExponent",
            "privkey.prime1",
            "privkey.prime2",
            "privkey.exponent1",
            "privkey.exponent2",
            "privkey.coefficient",
        ] {
            assert!(d.find(field).is_some(), "{field}");
        }
    }
}
