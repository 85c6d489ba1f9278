//! Write complete scan line files and inspect the raw bytes,
//! then read them back through the meta data and chunk machinery.

use std::io::Cursor;

use exr_codec::prelude::*;
use exr_codec::io::PeekRead;
use exr_codec::chunk::ScanLineBlock;

use smallvec::smallvec;


fn write_to_vec(header: Header, frame_buffer: &FrameBuffer<'_>, height: usize) -> Vec<u8> {
    let mut writer = ScanLineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(frame_buffer, height).unwrap();
    assert!(writer.is_complete());
    writer.into_inner().into_inner()
}


#[test]
fn uncompressed_rgb_file_layout() {
    let width = 128;
    let height = 128;

    let header = Header::new(
        Vec2(width, height),
        smallvec![
            ChannelDescription::named("R", SampleType::F16),
            ChannelDescription::named("G", SampleType::F16),
            ChannelDescription::named("B", SampleType::F16),
        ],
    ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

    let red: Vec<f16> = (0 .. width * height)
        .map(|index| f16::from_f32(index as f32 / (width * height) as f32))
        .collect();

    let green: Vec<f16> = red.iter().map(|&value| f16::from_f32(f16::to_f32(value) * 0.5)).collect();
    let blue = vec![ f16::from_f32(0.25); width * height ];

    let frame_buffer = FrameBuffer::new()
        .with("R", PixelSource::new(SampleSlice::F16(&red), 0, 1, width as i64))
        .with("G", PixelSource::new(SampleSlice::F16(&green), 0, 1, width as i64))
        .with("B", PixelSource::new(SampleSlice::F16(&blue), 0, 1, width as i64));

    let bytes = write_to_vec(header.clone(), &frame_buffer, height);

    // magic number and version word: version 2,
    // no flags as all names are short
    assert_eq!(&bytes[.. 4], &[ 0x76, 0x2f, 0x31, 0x01 ]);
    assert_eq!(&bytes[4 .. 8], &[ 2, 0, 0, 0 ]);

    // the meta data reads back to exactly what was written
    let mut read = PeekRead::new(bytes.as_slice());
    let meta = MetaData::read_validated_from_buffered_peekable(&mut read).unwrap();
    assert_eq!(meta.header, header);
    assert_eq!(meta.header.chunk_count, height);

    // channels are stored sorted by name
    let names: Vec<String> = meta.header.channels.list.iter()
        .map(|channel| channel.name.to_string()).collect();
    assert_eq!(names, [ "B", "G", "R" ]);

    // every offset points at the chunk of the corresponding scan line,
    // and uncompressed chunks are all the same size
    let offsets = MetaData::read_offset_table(&mut read, &meta.header).unwrap();
    assert_eq!(offsets.len(), height);

    let line_bytes = 3 * width * 2;
    let chunk_bytes = 8 + line_bytes;
    assert_eq!(bytes.len(), offsets[0] as usize + height * chunk_bytes);

    for (line, &offset) in offsets.iter().enumerate() {
        let chunk = &bytes[offset as usize ..][.. chunk_bytes];
        assert_eq!(chunk[.. 4], (line as i32).to_le_bytes());
        assert_eq!(chunk[4 .. 8], (line_bytes as i32).to_le_bytes());
    }

    // within a chunk, channels appear sorted: B, then G, then R
    let first_chunk = &bytes[offsets[0] as usize + 8 ..][.. line_bytes];
    assert_eq!(first_chunk[.. 2], blue[0].to_le_bytes());
    assert_eq!(first_chunk[width * 2 .. width * 2 + 2], green[0].to_le_bytes());
    assert_eq!(first_chunk[width * 4 .. width * 4 + 2], red[0].to_le_bytes());
}

#[test]
fn rle_pixels_decompress_to_the_original_samples() {
    let width = 64;
    let height = 7;

    let header = Header::new(
        Vec2(width, height),
        smallvec![ ChannelDescription::named("Y", SampleType::F32) ],
    ).with_encoding(Compression::RLE, LineOrder::Increasing);

    // long runs of equal bytes, the best case for run length encoding
    let samples: Vec<f32> = (0 .. width * height)
        .map(|index| (index / width) as f32)
        .collect();

    let frame_buffer = FrameBuffer::new()
        .with("Y", PixelSource::new(SampleSlice::F32(&samples), 0, 1, width as i64));

    let bytes = write_to_vec(header, &frame_buffer, height);

    let mut read = PeekRead::new(bytes.as_slice());
    let meta = MetaData::read_validated_from_buffered_peekable(&mut read).unwrap();
    let offsets = MetaData::read_offset_table(&mut read, &meta.header).unwrap();
    assert_eq!(offsets.len(), height);

    let line_bytes = width * 4;

    for (line, &offset) in offsets.iter().enumerate() {
        let mut chunk_read = &bytes[offset as usize ..];
        let block = ScanLineBlock::read(&mut chunk_read, &meta.header).unwrap();
        assert_eq!(block.y_coordinate, line as i32);

        let decompressed = meta.header.compression
            .decompress_bytes(block.compressed_pixels, line_bytes).unwrap();

        assert_eq!(decompressed.len(), line_bytes);
        for sample_bytes in decompressed.chunks_exact(4) {
            let sample = f32::from_le_bytes([
                sample_bytes[0], sample_bytes[1], sample_bytes[2], sample_bytes[3]
            ]);

            assert_eq!(sample, line as f32);
        }
    }
}

#[test]
fn split_writes_produce_the_same_bytes() {
    let width = 4;
    let height = 4;

    let samples: Vec<f32> = (0 .. width * height).map(|index| index as f32).collect();

    let make_header = || Header::new(
        Vec2(width, height),
        smallvec![ ChannelDescription::named("A", SampleType::F32) ],
    ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

    let frame_buffer = FrameBuffer::new()
        .with("A", PixelSource::new(SampleSlice::F32(&samples), 0, 1, width as i64));

    let all_at_once = write_to_vec(make_header(), &frame_buffer, height);

    let mut writer = ScanLineWriter::new(Cursor::new(Vec::new()), make_header()).unwrap();
    writer.write_pixels(&frame_buffer, 1).unwrap();
    writer.write_pixels(&frame_buffer, 2).unwrap();
    writer.write_pixels(&frame_buffer, 1).unwrap();
    assert!(writer.is_complete());

    assert_eq!(writer.into_inner().into_inner(), all_at_once);
}

#[test]
fn custom_attributes_survive_in_insertion_order() {
    let attributes = vec![
        (Text::from("zebra"), AttributeValue::I32(3)),
        (Text::from("antelope"), AttributeValue::F32(0.25)),
        (Text::from("comment"), AttributeValue::Text(Text::from("written by hand"))),
    ];

    let header = Header::new(
        Vec2(2, 2),
        smallvec![ ChannelDescription::named("L", SampleType::F32) ],
    )
        .with_encoding(Compression::Uncompressed, LineOrder::Increasing)
        .with_attributes(attributes.clone());

    let samples = [ 0.0_f32; 4 ];
    let frame_buffer = FrameBuffer::new()
        .with("L", PixelSource::new(SampleSlice::F32(&samples), 0, 1, 2));

    let bytes = write_to_vec(header, &frame_buffer, 2);
    let meta = MetaData::read_from_buffered(bytes.as_slice()).unwrap();
    assert_eq!(meta.header.custom_attributes, attributes);
}

#[test]
fn truncated_files_are_rejected() {
    let header = Header::new(
        Vec2(3, 3),
        smallvec![ ChannelDescription::named("Y", SampleType::F32) ],
    ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

    let samples = [ 0.5_f32; 9 ];
    let frame_buffer = FrameBuffer::new()
        .with("Y", PixelSource::new(SampleSlice::F32(&samples), 0, 1, 3));

    let bytes = write_to_vec(header, &frame_buffer, 3);

    // cut the file in the middle of the header attributes
    let result = MetaData::read_from_buffered(&bytes[.. 40]);
    assert!(matches!(result, Err(Error::Invalid(_))));

    // a file ending right after the magic number
    let result = MetaData::read_from_buffered(&bytes[.. 4]);
    assert!(matches!(result, Err(Error::Invalid(_))));
}

#[test]
fn conflicting_and_unknown_version_flags_are_rejected() {
    let header = Header::new(
        Vec2(1, 1),
        smallvec![ ChannelDescription::named("Y", SampleType::F32) ],
    ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

    let samples = [ 1.0_f32 ];
    let frame_buffer = FrameBuffer::new()
        .with("Y", PixelSource::new(SampleSlice::F32(&samples), 0, 1, 1));

    let bytes = write_to_vec(header, &frame_buffer, 1);

    // the tile flag combined with the deep data flag is contradictory
    let mut conflicting = bytes.clone();
    conflicting[5] |= 0b0000_1010;
    assert!(matches!(
        MetaData::read_from_buffered(conflicting.as_slice()),
        Err(Error::Invalid(_))
    ));

    // so is the tile flag combined with the multipart flag
    let mut conflicting = bytes.clone();
    conflicting[5] |= 0b0001_0010;
    assert!(matches!(
        MetaData::read_from_buffered(conflicting.as_slice()),
        Err(Error::Invalid(_))
    ));

    // flag bits above the defined range belong to future file versions
    let mut unknown = bytes.clone();
    unknown[5] |= 0b0010_0000;
    assert!(matches!(
        MetaData::read_from_buffered(unknown.as_slice()),
        Err(Error::NotSupported(_))
    ));

    // a version number other than 2 is not readable
    let mut versioned = bytes;
    versioned[4] = 3;
    assert!(matches!(
        MetaData::read_from_buffered(versioned.as_slice()),
        Err(Error::NotSupported(_))
    ));
}
