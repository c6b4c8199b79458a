//! Codec Module Tests
//!
//! ## Test Scopes
//! - **Packet Types**: one-hot flag mapping and rejection of invalid flags.
//! - **Construction**: size limits and the type/data rules enforced at build time.
//! - **Wire Format**: header layout, node sub-format, round trips and malformed input.

#[cfg(test)]
mod tests {
    use crate::codec::types::{HEADER_LEN, MAX_DATA_LENGTH, MAX_FIELD_COUNT, NODE_RECORD_LEN};
    use crate::codec::{
        CodecError, DecodeError, NodeRecord, NodeStatus, Packet, PacketType, decode, decode_node,
        encode, encode_node,
    };
    use proptest::prelude::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    const NOW: u64 = 1_700_000_000_000;

    fn record(id: u16, last: u8, port: u16) -> NodeRecord {
        NodeRecord::new(id, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last), port))
    }

    fn many_records(count: usize) -> Vec<NodeRecord> {
        (0..count)
            .map(|i| {
                NodeRecord::new(
                    i as u16,
                    SocketAddrV4::new(Ipv4Addr::new(10, 1, (i >> 8) as u8, i as u8), 9876),
                )
            })
            .collect()
    }

    // ============================================================
    // PACKET TYPE TESTS
    // ============================================================

    #[test]
    fn test_packet_type_flags_are_one_hot() {
        for kind in PacketType::ALL {
            assert_eq!(
                kind.flag().count_ones(),
                1,
                "{} must set exactly one bit",
                kind
            );
            assert_eq!(PacketType::from_flag(kind.flag()), Some(kind));
        }
    }

    #[test]
    fn test_packet_type_rejects_zero_and_multiple_bits() {
        assert_eq!(PacketType::from_flag(0), None);
        assert_eq!(PacketType::from_flag(0b0100_0010), None);
        assert_eq!(PacketType::from_flag(0xFF), None);
    }

    #[test]
    fn test_signal_types_do_not_carry_data() {
        let silent = [
            PacketType::Ping,
            PacketType::Ack,
            PacketType::Init,
            PacketType::Crq,
            PacketType::Resend,
        ];
        for kind in silent {
            assert!(!kind.carries_data());
        }
        assert!(PacketType::Raw.carries_data());
        assert!(PacketType::Csum.carries_data());
        assert!(PacketType::Status.carries_data());
    }

    // ============================================================
    // CONSTRUCTION TESTS
    // ============================================================

    #[test]
    fn test_ping_with_data_is_rejected() {
        let result = Packet::new(3, Ipv4Addr::LOCALHOST, PacketType::Ping, vec![1, 2, 3]);

        assert_eq!(
            result,
            Err(CodecError::PacketTypeDataMismatch {
                packet_type: PacketType::Ping,
                length: 3,
            })
        );
    }

    #[test]
    fn test_ping_round_trip_has_empty_data() {
        let packet = Packet::signal(7, Ipv4Addr::new(192, 168, 1, 20), PacketType::Ping);

        let decoded = decode(&encode(&packet)).expect("ping should decode");

        assert_eq!(decoded.packet_type(), PacketType::Ping);
        assert_eq!(decoded.data_length(), 0);
        assert!(decoded.data().is_empty());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_status_field_limit() {
        let records = many_records(MAX_FIELD_COUNT);
        let at_limit = Packet::status(0, Ipv4Addr::LOCALHOST, &records, NOW)
            .expect("4093 fields must be accepted");
        assert_eq!(at_limit.num_fields() as usize, MAX_FIELD_COUNT);

        let records = many_records(MAX_FIELD_COUNT + 1);
        let over = Packet::status(0, Ipv4Addr::LOCALHOST, &records, NOW);
        assert_eq!(
            over,
            Err(CodecError::MaxFieldCountExceeded {
                count: MAX_FIELD_COUNT + 1
            })
        );
    }

    #[test]
    fn test_data_length_limit() {
        let at_limit = Packet::new(
            0,
            Ipv4Addr::LOCALHOST,
            PacketType::Raw,
            vec![0xAB; MAX_DATA_LENGTH],
        );
        assert!(at_limit.is_ok());

        let over = Packet::new(
            0,
            Ipv4Addr::LOCALHOST,
            PacketType::Csum,
            vec![0xAB; MAX_DATA_LENGTH + 1],
        );
        assert_eq!(
            over,
            Err(CodecError::MaxDataLengthExceeded {
                length: MAX_DATA_LENGTH + 1
            })
        );
    }

    #[test]
    fn test_status_from_raw_bytes_counts_fields() {
        let data: Vec<u8> = [record(0, 1, 9876), record(1, 2, 9876)]
            .iter()
            .flat_map(|node| encode_node(node, NOW))
            .collect();

        let packet = Packet::new(0, Ipv4Addr::LOCALHOST, PacketType::Status, data)
            .expect("two whole records");
        assert_eq!(packet.num_fields(), 2);

        let ragged = Packet::new(0, Ipv4Addr::LOCALHOST, PacketType::Status, vec![0; 17]);
        assert!(matches!(
            ragged,
            Err(CodecError::PacketTypeDataMismatch { length: 17, .. })
        ));
    }

    // ============================================================
    // WIRE FORMAT TESTS
    // ============================================================

    #[test]
    fn test_header_layout() {
        let packet = Packet::new(
            0x0102,
            Ipv4Addr::new(10, 20, 30, 40),
            PacketType::Raw,
            vec![0xDE, 0xAD],
        )
        .unwrap();

        let bytes = encode(&packet);

        assert_eq!(bytes.len(), HEADER_LEN + 2);
        assert_eq!(&bytes[0..4], &[10, 20, 30, 40]);
        assert_eq!(&bytes[4..6], &[0x01, 0x02]);
        assert_eq!(&bytes[6..8], &[0x00, 0x02]);
        assert_eq!(bytes[8], 0b1000_0000);
        assert_eq!(bytes[9], 0);
        assert_eq!(&bytes[10..12], &[0, 0]);
        assert_eq!(&bytes[12..], &[0xDE, 0xAD]);
    }

    #[test]
    fn test_status_round_trip() {
        let mut first = record(4, 1, 9876);
        first.status = NodeStatus::Active;
        first.last_contact = Some(NOW - 1_500);
        let mut second = record(9, 2, 9000);
        second.status = NodeStatus::Offline;
        second.last_contact = Some(NOW - 45_000);

        let packet = Packet::status(2, Ipv4Addr::new(10, 0, 0, 100), &[first, second], NOW)
            .expect("two records fit");
        let bytes = encode(&packet);
        let decoded = decode(&bytes).expect("status should decode");

        assert_eq!(decoded, packet);
        assert_eq!(decoded.num_fields(), 2);
        assert_eq!(decoded.data_length() as usize, 2 * NODE_RECORD_LEN);
        assert_eq!(&bytes[10..12], &[0, 2]);

        let nodes = decoded.nodes(NOW).expect("records should decode");
        assert_eq!(nodes, vec![first, second]);
    }

    #[test]
    fn test_field_count_reserved_bits_are_ignored() {
        let packet = Packet::status(0, Ipv4Addr::LOCALHOST, &[record(0, 1, 1)], NOW);
        let mut bytes = encode(&packet.unwrap());
        bytes[10] |= 0xF0;

        let decoded = decode(&bytes).expect("reserved bits are masked");
        assert_eq!(decoded.num_fields(), 1);
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let packet = Packet::signal(1, Ipv4Addr::LOCALHOST, PacketType::Ack);
        let mut bytes = encode(&packet);
        bytes.extend_from_slice(&[0u8; 64]);

        assert_eq!(decode(&bytes), Ok(packet));
    }

    #[test]
    fn test_decode_short_buffer_is_malformed() {
        let result = decode(&[0u8; HEADER_LEN - 1]);
        assert!(matches!(result, Err(DecodeError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_truncated_data_is_malformed() {
        let packet = Packet::new(0, Ipv4Addr::LOCALHOST, PacketType::Raw, vec![1; 8]);
        let bytes = encode(&packet.unwrap());

        let result = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(DecodeError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut bytes = encode(&Packet::signal(0, Ipv4Addr::LOCALHOST, PacketType::Ping));

        bytes[8] = 0;
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownPacketType(0)));

        bytes[8] = 0b0110_0000;
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownPacketType(0b0110_0000))
        );
    }

    #[test]
    fn test_decode_signal_with_data_is_malformed() {
        let packet = Packet::new(0, Ipv4Addr::LOCALHOST, PacketType::Raw, vec![7; 4]);
        let mut bytes = encode(&packet.unwrap());
        bytes[8] = PacketType::Ping.flag();

        let result = decode(&bytes);
        assert!(matches!(result, Err(DecodeError::MalformedPacket(_))));
    }

    #[test]
    fn test_decode_reserved_byte_must_be_zero() {
        let mut bytes = encode(&Packet::signal(0, Ipv4Addr::LOCALHOST, PacketType::Init));
        bytes[9] = 1;

        let result = decode(&bytes);
        assert!(matches!(result, Err(DecodeError::MalformedPacket(_))));
    }

    // ============================================================
    // NODE SUB-FORMAT TESTS
    // ============================================================

    #[test]
    fn test_node_layout() {
        let node = NodeRecord {
            id: 0x0A0B,
            address: Ipv4Addr::new(172, 16, 0, 9),
            port: 9876,
            status: NodeStatus::Offline,
            last_contact: Some(NOW - 0x0102),
        };

        let bytes = encode_node(&node, NOW);

        assert_eq!(&bytes[0..4], &[172, 16, 0, 9]);
        assert_eq!(&bytes[4..6], &[0x0A, 0x0B]);
        assert_eq!(&bytes[6..8], &9876u16.to_be_bytes());
        assert_eq!(bytes[8], 0b011 << 5);
        assert_eq!(bytes[9], 0);
        assert_eq!(&bytes[10..16], &[0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn test_node_round_trip() {
        let node = NodeRecord {
            id: 12,
            address: Ipv4Addr::new(10, 0, 0, 5),
            port: 9876,
            status: NodeStatus::Online,
            last_contact: Some(NOW - 12_345),
        };

        let decoded = decode_node(&encode_node(&node, NOW), NOW).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_node_round_trip_across_clocks() {
        let node = NodeRecord {
            last_contact: Some(NOW - 10_000),
            status: NodeStatus::Active,
            ..record(1, 7, 9876)
        };

        // Receiver decodes 250 ms after the sender encoded.
        let decoded = decode_node(&encode_node(&node, NOW), NOW + 250).unwrap();
        assert_eq!(decoded.last_contact, Some(NOW + 250 - 10_000));
    }

    #[test]
    fn test_node_unknown_contact() {
        let node = record(3, 3, 9876);

        let bytes = encode_node(&node, NOW);
        assert_eq!(&bytes[10..16], &[0; 6]);

        let decoded = decode_node(&bytes, NOW).unwrap();
        assert_eq!(decoded.last_contact, None);
        assert_eq!(decoded.status, NodeStatus::Unknown);
    }

    #[test]
    fn test_node_tslc_of_one_means_unknown() {
        let mut bytes = encode_node(&record(3, 3, 9876), NOW);
        bytes[15] = 1;

        assert_eq!(decode_node(&bytes, NOW).unwrap().last_contact, None);
    }

    #[test]
    fn test_node_fresh_contact_stays_known() {
        let node = NodeRecord {
            last_contact: Some(NOW),
            status: NodeStatus::Active,
            ..record(0, 1, 9876)
        };

        let decoded = decode_node(&encode_node(&node, NOW), NOW).unwrap();
        let last = decoded.last_contact.expect("contact must survive encoding");
        assert!(NOW - last <= 2);
    }

    #[test]
    fn test_node_wrong_length_is_malformed() {
        assert!(matches!(
            decode_node(&[0u8; NODE_RECORD_LEN - 1], NOW),
            Err(DecodeError::MalformedPacket(_))
        ));
    }

    // ============================================================
    // STATUS TRANSITION TESTS
    // ============================================================

    #[test]
    fn test_status_transitions() {
        use NodeStatus::*;

        assert!(Unknown.can_transition_to(Active));
        assert!(Active.can_transition_to(Online));
        assert!(Online.can_transition_to(Active));
        assert!(Active.can_transition_to(Offline));
        assert!(Online.can_transition_to(Offline));
        assert!(Offline.can_transition_to(Active));

        assert!(!Active.can_transition_to(Unknown));
        assert!(!Offline.can_transition_to(Unknown));
        assert!(!Offline.can_transition_to(Online));
        assert!(!Unknown.can_transition_to(Online));
    }

    // ============================================================
    // ROUND TRIP PROPERTIES
    // ============================================================

    fn any_status() -> impl Strategy<Value = NodeStatus> {
        prop_oneof![
            Just(NodeStatus::Active),
            Just(NodeStatus::Online),
            Just(NodeStatus::Offline),
            Just(NodeStatus::Unknown),
        ]
    }

    fn any_record() -> impl Strategy<Value = NodeRecord> {
        (
            any::<u16>(),
            any::<[u8; 4]>(),
            any::<u16>(),
            any_status(),
            proptest::option::of(0u64..=NOW),
        )
            .prop_map(|(id, octets, port, status, tslc)| NodeRecord {
                status,
                last_contact: tslc.map(|tslc| NOW - tslc),
                ..NodeRecord::new(id, SocketAddrV4::new(Ipv4Addr::from(octets), port))
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn test_signal_packets_round_trip(
            kind_index in 0..PacketType::ALL.len(),
            id in any::<u16>(),
            octets in any::<[u8; 4]>(),
        ) {
            let kind = PacketType::ALL[kind_index];
            prop_assume!(!kind.carries_data());

            let packet = Packet::signal(id, Ipv4Addr::from(octets), kind);
            let decoded = decode(&encode(&packet)).unwrap();

            prop_assert_eq!(decoded.data_length(), 0);
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn test_data_packets_round_trip(
            csum in any::<bool>(),
            id in any::<u16>(),
            octets in any::<[u8; 4]>(),
            data in proptest::collection::vec(any::<u8>(), 0..=MAX_DATA_LENGTH),
        ) {
            let kind = if csum { PacketType::Csum } else { PacketType::Raw };
            let packet = Packet::new(id, Ipv4Addr::from(octets), kind, data).unwrap();
            let bytes = encode(&packet);

            prop_assert_eq!(bytes.len(), HEADER_LEN + packet.data().len());
            prop_assert_eq!(decode(&bytes).unwrap(), packet);
        }

        #[test]
        fn test_node_record_round_trip(node in any_record()) {
            let decoded = decode_node(&encode_node(&node, NOW), NOW).unwrap();

            prop_assert_eq!(decoded.id, node.id);
            prop_assert_eq!(decoded.socket_addr(), node.socket_addr());
            prop_assert_eq!(decoded.status, node.status);
            match (node.last_contact, decoded.last_contact) {
                (None, None) => {}
                (Some(sent), Some(received)) => prop_assert!(sent.abs_diff(received) <= 2),
                (sent, received) => {
                    prop_assert!(false, "contact {:?} came back as {:?}", sent, received)
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_status_packets_round_trip(
            id in any::<u16>(),
            octets in any::<[u8; 4]>(),
            nodes in proptest::collection::vec(any_record(), 0..=MAX_FIELD_COUNT),
        ) {
            let packet = Packet::status(id, Ipv4Addr::from(octets), &nodes, NOW).unwrap();
            let decoded = decode(&encode(&packet)).unwrap();

            prop_assert_eq!(decoded.num_fields() as usize, nodes.len());
            prop_assert_eq!(decoded.data_length() as usize, nodes.len() * NODE_RECORD_LEN);
            prop_assert_eq!(decoded, packet);
        }
    }
}
